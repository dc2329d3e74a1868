//! salt-ssh connection settings.
//!
//! The settings are opaque to the dispatcher: they are serialized into the
//! request object next to `fun`/`tgt` and interpreted by the backend. Unset
//! settings emit no key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Settings for a salt-ssh dispatch.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote user to log in as.
    #[serde(rename = "ssh_user", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password for the remote user.
    #[serde(rename = "ssh_passwd", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path of the private key on the master.
    #[serde(rename = "ssh_priv", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Remote SSH port.
    #[serde(rename = "ssh_port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Run commands through sudo.
    #[serde(rename = "ssh_sudo", skip_serializing_if = "Option::is_none")]
    pub sudo: Option<bool>,
    /// Use only the configured identity, ignoring agent keys.
    #[serde(rename = "ssh_identities_only", skip_serializing_if = "Option::is_none")]
    pub identities_only: Option<bool>,
    /// Skip host key verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_host_keys: Option<bool>,
    /// Do not store or check host keys at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_host_keys: Option<bool>,
    /// Deploy the master's key to the target on first login.
    #[serde(rename = "ssh_key_deploy", skip_serializing_if = "Option::is_none")]
    pub key_deploy: Option<bool>,
    /// Connection timeout in seconds.
    #[serde(rename = "ssh_timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// Maximum number of concurrent SSH sessions.
    #[serde(rename = "ssh_max_procs", skip_serializing_if = "Option::is_none")]
    pub max_procs: Option<u32>,
    /// Roster module to resolve targets with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<String>,
    /// Alternate roster file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_file: Option<String>,
    /// Refresh the thin agent cache on the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_cache: Option<bool>,
    /// Remove the deployed thin agent after the run.
    #[serde(rename = "ssh_wipe", skip_serializing_if = "Option::is_none")]
    pub wipe: Option<bool>,
    /// Execute raw shell commands instead of execution-module functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_shell: Option<bool>,
    /// Extra file references shipped to the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_filerefs: Option<String>,
}

impl SshConfig {
    /// Returns the pass-through request fields for this configuration.
    pub fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            // A struct of options and scalars always serializes to an object.
            _ => Map::new(),
        }
    }
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields = self.fields();
        if fields.contains_key("ssh_passwd") {
            fields.insert("ssh_passwd".to_string(), Value::String("<redacted>".to_string()));
        }
        f.debug_tuple("SshConfig").field(&fields).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unset_settings_emit_nothing() {
        assert!(SshConfig::default().fields().is_empty());
    }

    #[test]
    fn settings_use_backend_field_names() {
        let cfg = SshConfig {
            user: Some("root".to_string()),
            private_key: Some("/etc/salt/pki/master/ssh/salt-ssh.rsa".to_string()),
            ignore_host_keys: Some(true),
            timeout: Some(30),
            ..SshConfig::default()
        };
        let fields = cfg.fields();
        assert_eq!(fields["ssh_user"], json!("root"));
        assert_eq!(fields["ssh_priv"], json!("/etc/salt/pki/master/ssh/salt-ssh.rsa"));
        assert_eq!(fields["ignore_host_keys"], json!(true));
        assert_eq!(fields["ssh_timeout"], json!(30));
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let cfg = SshConfig {
            password: Some("hunter2".to_string()),
            ..SshConfig::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
