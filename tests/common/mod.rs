//! Common testing utilities for Vault Extract integration tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;
use vault_extract::provider::{DecryptionProvider, RawToolOutput};
use vault_extract::ExtractError;

/// Test context that manages temporary files and directories.
pub struct TestContext {
    /// Path to temporary directory
    pub temp_path: PathBuf,
    /// The temporary directory (kept to prevent early deletion)
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a temporary directory.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path().to_path_buf();

        Ok(Self {
            temp_path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a test file with content.
    pub fn create_file(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let file_path = self.temp_path.join(name);
        let mut file = fs::File::create(&file_path)?;
        file.write_all(content.as_bytes())?;
        Ok(file_path)
    }

    /// Create the source and password files every run needs.
    #[allow(dead_code)]
    pub fn create_inputs(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        let source = self.create_file(
            "secrets.yml",
            "$ANSIBLE_VAULT;1.1;AES256\n6638643965...\n",
        )?;
        let password = self.create_file("vault_password.txt", "correct horse\n")?;
        Ok((source, password))
    }

    /// Write an executable fake `ansible` into `bin/` and return that directory.
    ///
    /// The script records its arguments, and whether the inventory file
    /// existed while it ran, to `$FAKE_ANSIBLE_RECORD`. It prints
    /// `$FAKE_ANSIBLE_STDOUT` (a file) and `$FAKE_ANSIBLE_STDERR` (text), then
    /// exits with `$FAKE_ANSIBLE_EXIT`. `$FAKE_ANSIBLE_SLEEP` makes it hang.
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn create_fake_ansible(&self) -> anyhow::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.temp_path.join("bin");
        fs::create_dir_all(&bin)?;
        let script = bin.join("ansible");
        fs::write(&script, FAKE_ANSIBLE)?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok(bin)
    }

    /// Get the path to a file in the temp directory.
    #[allow(dead_code)]
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_path.join(name)
    }
}

#[cfg(unix)]
const FAKE_ANSIBLE: &str = r#"#!/bin/sh
if [ -n "$FAKE_ANSIBLE_RECORD" ]; then
    printf '%s\n' "$@" > "$FAKE_ANSIBLE_RECORD"
    if [ -f "$3" ]; then
        echo "inventory-present" >> "$FAKE_ANSIBLE_RECORD"
        cat "$3" >> "$FAKE_ANSIBLE_RECORD"
    fi
fi
if [ -n "$FAKE_ANSIBLE_SLEEP" ]; then
    exec sleep "$FAKE_ANSIBLE_SLEEP"
fi
if [ -n "$FAKE_ANSIBLE_STDOUT" ]; then
    cat "$FAKE_ANSIBLE_STDOUT"
fi
if [ -n "$FAKE_ANSIBLE_STDERR" ]; then
    printf '%s\n' "$FAKE_ANSIBLE_STDERR" >&2
fi
exit "${FAKE_ANSIBLE_EXIT:-0}"
"#;

/// Serializes tests that write and then execute scripts.
///
/// Executing a file while another thread still holds a write handle to some
/// other fresh script can fail with "Text file busy" after a concurrent fork.
#[allow(dead_code)]
pub fn script_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock ansible command outputs for testing.
pub struct MockAnsible;

#[allow(dead_code)]
impl MockAnsible {
    /// Output of `ansible localhost -m debug -a var=hostvars[inventory_hostname]`
    /// with the given user variables plus the usual internal ones.
    pub fn debug_output(user_vars: serde_json::Value) -> String {
        let mut vars = serde_json::Map::new();
        vars.insert("ansible_check_mode".into(), serde_json::json!(false));
        vars.insert("ansible_connection".into(), serde_json::json!("local"));
        vars.insert("ansible_playbook_python".into(), serde_json::json!("/usr/bin/python3"));
        vars.insert("ansible_version".into(), serde_json::json!({"full": "2.16.3", "major": 2}));
        if let serde_json::Value::Object(user) = user_vars {
            vars.extend(user);
        }
        vars.insert("group_names".into(), serde_json::json!([]));
        vars.insert(
            "groups".into(),
            serde_json::json!({"all": ["localhost"], "ungrouped": ["localhost"]}),
        );
        vars.insert("inventory_dir".into(), serde_json::json!("/tmp"));
        vars.insert("inventory_file".into(), serde_json::json!("/tmp/vault-extract-x.ini"));
        vars.insert("inventory_hostname".into(), serde_json::json!("localhost"));
        vars.insert("inventory_hostname_short".into(), serde_json::json!("localhost"));
        vars.insert(
            "omit".into(),
            serde_json::json!("__omit_place_holder__4a4d2bcb0e1c"),
        );
        vars.insert("playbook_dir".into(), serde_json::json!("/home/ops"));

        let payload = serde_json::json!({ "hostvars[inventory_hostname]": vars });
        format!(
            "localhost | SUCCESS => {}\n",
            serde_json::to_string_pretty(&payload).unwrap()
        )
    }

    /// Python-literal flavour of the same output, as older callbacks print it.
    pub fn python_debug_output(body: &str) -> String {
        format!(
            "localhost | SUCCESS => {{'hostvars[inventory_hostname]': {{'ansible_check_mode': False, 'inventory_hostname': 'localhost', {}}}}}\n",
            body
        )
    }
}

/// Provider returning canned output instead of running a tool.
#[allow(dead_code)]
pub enum FakeProvider {
    Output(RawToolOutput),
    Failure { code: i32, stderr: String },
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        FakeProvider::Output(RawToolOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            status: Some(0),
        })
    }
}

impl DecryptionProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn decrypt(&self, _source: &Path, _credential: &Path) -> vault_extract::Result<RawToolOutput> {
        match self {
            FakeProvider::Output(raw) => Ok(raw.clone()),
            FakeProvider::Failure { code, stderr } => Err(ExtractError::ToolInvocationFailed {
                tool: "fake".into(),
                code: Some(*code),
                stderr: stderr.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_debug_output_has_banner_and_payload() {
        let output = MockAnsible::debug_output(serde_json::json!({"api_key": "k"}));

        assert!(output.starts_with("localhost | SUCCESS => {"));
        let json: serde_json::Value =
            serde_json::from_str(output.trim_start_matches("localhost | SUCCESS => ")).unwrap();
        assert_eq!(json["hostvars[inventory_hostname]"]["api_key"], "k");
    }

    #[test]
    fn test_test_context_create_file() {
        let ctx = TestContext::new().unwrap();
        let file_path = ctx.create_file("test.txt", "Hello, World!").unwrap();

        assert!(file_path.exists());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Hello, World!");
    }
}
