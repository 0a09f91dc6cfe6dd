use crate::entry::{Enrollment, parse_provisioning_uri};
use crate::error::{AuthError, Result};
use crate::totp;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const STORE_FILE: &str = "services.json";

/// Data directory of the tool (for example `~/.local/share/auth-manager`)
pub fn store_root() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("cannot get data dir"))?;
    dir.push("auth-manager");
    Ok(dir)
}

pub fn default_store_path() -> anyhow::Result<PathBuf> {
    Ok(store_root()?.join(STORE_FILE))
}

/// Named TOTP enrollments, kept as raw provisioning URIs and written back to
/// a JSON file after every change.
///
/// The registry does no locking. Callers sharing one across threads must
/// serialize access themselves.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    services: BTreeMap<String, String>,
}

impl Registry {
    /// Open the registry stored at `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let services = load_services(&path);
        Self { path, services }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Service names in the order they are written to disk.
    pub fn list_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Stored provisioning URI for `name`.
    pub fn uri(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(String::as_str)
    }

    /// Insert or replace `name`. The URI is validated first; an invalid one
    /// leaves both memory and disk untouched.
    pub fn add(&mut self, name: &str, uri: &str) -> Result<()> {
        if name.is_empty() {
            return Err(AuthError::InvalidName);
        }
        parse_provisioning_uri(uri)?;

        let replaced = self.services.insert(name.to_string(), uri.to_string());
        info!(service = name, replaced = replaced.is_some(), "service saved");
        self.save()
    }

    /// Rename `old_name` to `new_name` with a new URI. A missing `old_name`
    /// makes this a plain add.
    pub fn edit(&mut self, old_name: &str, new_name: &str, uri: &str) -> Result<()> {
        if new_name.is_empty() {
            return Err(AuthError::InvalidName);
        }
        parse_provisioning_uri(uri)?;

        if self.services.remove(old_name).is_none() {
            debug!(service = old_name, "edited service did not exist");
        }
        self.services.insert(new_name.to_string(), uri.to_string());
        info!(from = old_name, to = new_name, "service updated");
        self.save()
    }

    /// Remove `name`. Removing an absent name does nothing, on disk included.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.services.remove(name).is_none() {
            debug!(service = name, "nothing to delete");
            return Ok(());
        }
        info!(service = name, "service deleted");
        self.save()
    }

    /// Parsed enrollment for `name`.
    pub fn enrollment(&self, name: &str) -> Result<Enrollment> {
        let uri = self
            .services
            .get(name)
            .ok_or_else(|| AuthError::NotFound(name.to_string()))?;
        let mut enrollment = parse_provisioning_uri(uri).map_err(|e| code_failed(name, e))?;
        enrollment.name = name.to_string();
        Ok(enrollment)
    }

    /// Code for `name` right now.
    pub fn get_code(&self, name: &str) -> Result<String> {
        self.get_code_at(name, totp::now_unix())
    }

    pub fn get_code_at(&self, name: &str, unix_time: u64) -> Result<String> {
        let enrollment = self.enrollment(name)?;
        enrollment
            .code_at(unix_time)
            .map_err(|e| code_failed(name, e))
    }

    /// Rewrite the whole file through a temp file in the same directory.
    fn save(&self) -> Result<()> {
        let failed = |source: std::io::Error| AuthError::PersistenceFailed {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(failed)?;

        let json = serde_json::to_string_pretty(&self.services)
            .map_err(|e| failed(std::io::Error::other(e)))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(failed)?;
        tmp.write_all(json.as_bytes()).map_err(failed)?;
        tmp.write_all(b"\n").map_err(failed)?;
        tmp.as_file().sync_all().map_err(failed)?;
        tmp.persist(&self.path).map_err(|e| failed(e.error))?;

        debug!(path = %self.path.display(), services = self.services.len(), "registry written");
        Ok(())
    }
}

fn code_failed(name: &str, source: AuthError) -> AuthError {
    warn!(service = name, error = %source, "cannot generate code");
    AuthError::CodeGenerationFailed {
        name: name.to_string(),
        source: Box::new(source),
    }
}

fn load_services(path: &Path) -> BTreeMap<String, String> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no registry yet, starting empty");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read registry, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, String>>(&data) {
        Ok(services) => {
            debug!(path = %path.display(), services = services.len(), "registry loaded");
            services
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "registry is malformed, starting empty");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const URI: &str = "otpauth://totp/TestService?secret=JBSWY3DPEHPK3PXP";
    const URI_SHA256: &str =
        "otpauth://totp/Other?secret=GEZDGNBVGY3TQOJQ&algorithm=SHA256&digits=8&period=60";

    fn fresh() -> (tempfile::TempDir, Registry) {
        let dir = tempdir().unwrap();
        let reg = Registry::open(dir.path().join("services.json"));
        (dir, reg)
    }

    fn on_disk(reg: &Registry) -> BTreeMap<String, String> {
        serde_json::from_str(&fs::read_to_string(reg.path()).unwrap()).unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, reg) = fresh();
        assert!(reg.is_empty());
        assert!(reg.list_names().is_empty());
        assert!(!reg.path().exists());
    }

    #[test]
    fn malformed_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("services.json");

        for junk in ["{ not json", "[1, 2, 3]", "{\"a\": 5}", ""] {
            fs::write(&path, junk).unwrap();
            let reg = Registry::open(&path);
            assert!(reg.is_empty(), "{junk:?}");
        }
    }

    #[test]
    fn add_persists_and_reloads() {
        let (_dir, mut reg) = fresh();
        reg.add("TestService", URI).unwrap();
        reg.add("Other", URI_SHA256).unwrap();

        let reloaded = Registry::open(reg.path());
        assert_eq!(reloaded.list_names(), vec!["Other", "TestService"]);
        assert_eq!(reloaded.uri("TestService"), Some(URI));
        assert_eq!(reloaded.uri("Other"), Some(URI_SHA256));
        assert_eq!(on_disk(&reg).len(), 2);
    }

    #[test]
    fn add_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let mut reg = Registry::open(dir.path().join("nested/deeper/services.json"));
        reg.add("TestService", URI).unwrap();
        assert!(reg.path().exists());
    }

    #[test]
    fn add_overwrites() {
        let (_dir, mut reg) = fresh();
        reg.add("Svc", URI).unwrap();
        reg.add("Svc", URI_SHA256).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.uri("Svc"), Some(URI_SHA256));
        let e = reg.enrollment("Svc").unwrap();
        assert_eq!(e.digits, 8);
        assert_eq!(e.period, 60);
        assert_eq!(reg.get_code("Svc").unwrap().len(), 8);
    }

    #[test]
    fn add_rejects_empty_name() {
        let (_dir, mut reg) = fresh();
        assert!(matches!(reg.add("", URI), Err(AuthError::InvalidName)));
        assert!(reg.is_empty());
        assert!(!reg.path().exists());
    }

    #[test]
    fn add_rejects_bad_uri_without_writing() {
        let (_dir, mut reg) = fresh();
        reg.add("Keep", URI).unwrap();
        let before = fs::read_to_string(reg.path()).unwrap();

        assert!(matches!(
            reg.add("Bad", "otpauth://totp/Bad?secret=1!!"),
            Err(AuthError::InvalidSecret(_))
        ));
        assert!(matches!(
            reg.add("Bad", "otpauth://hotp/Bad?secret=JBSWY3DPEHPK3PXP"),
            Err(AuthError::UnsupportedType(_))
        ));
        assert!(matches!(
            reg.add("Bad", "otpauth://totp/Bad"),
            Err(AuthError::MissingSecret)
        ));

        assert_eq!(reg.list_names(), vec!["Keep"]);
        assert_eq!(fs::read_to_string(reg.path()).unwrap(), before);
    }

    #[test]
    fn edit_renames() {
        let (_dir, mut reg) = fresh();
        reg.add("A", URI).unwrap();
        reg.edit("A", "B", URI_SHA256).unwrap();

        assert_eq!(reg.list_names(), vec!["B"]);
        assert_eq!(reg.enrollment("B").unwrap().digits, 8);
        assert!(matches!(reg.get_code("A"), Err(AuthError::NotFound(_))));
        assert_eq!(on_disk(&reg).keys().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn edit_missing_old_name_adds() {
        let (_dir, mut reg) = fresh();
        reg.edit("Ghost", "B", URI).unwrap();
        assert_eq!(reg.list_names(), vec!["B"]);
        assert_eq!(reg.uri("B"), Some(URI));
    }

    #[test]
    fn edit_same_name_replaces_uri() {
        let (_dir, mut reg) = fresh();
        reg.add("A", URI).unwrap();
        reg.edit("A", "A", URI_SHA256).unwrap();
        assert_eq!(reg.list_names(), vec!["A"]);
        assert_eq!(reg.uri("A"), Some(URI_SHA256));
    }

    #[test]
    fn edit_with_bad_uri_keeps_old_entry() {
        let (_dir, mut reg) = fresh();
        reg.add("A", URI).unwrap();
        assert!(reg.edit("A", "B", "otpauth://totp/B?digits=6").is_err());
        assert!(matches!(reg.edit("A", "", URI), Err(AuthError::InvalidName)));
        assert_eq!(reg.list_names(), vec!["A"]);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, mut reg) = fresh();
        reg.add("A", URI).unwrap();
        reg.delete("A").unwrap();
        assert!(reg.is_empty());
        assert!(on_disk(&reg).is_empty());

        reg.delete("A").unwrap();
        reg.delete("A").unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn delete_absent_does_not_create_file() {
        let (_dir, mut reg) = fresh();
        reg.delete("nobody").unwrap();
        assert!(!reg.path().exists());
    }

    #[test]
    fn codes_are_digits_of_the_right_length() {
        let (_dir, mut reg) = fresh();
        reg.add("six", URI).unwrap();
        reg.add("eight", URI_SHA256).unwrap();

        for (name, len) in [("six", 6), ("eight", 8)] {
            let code = reg.get_code(name).unwrap();
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_at_is_deterministic() {
        let (_dir, mut reg) = fresh();
        reg.add("A", URI).unwrap();
        let secret = totp::decode_secret("JBSWY3DPEHPK3PXP").unwrap();
        let expected =
            totp::compute_code(&secret, totp::Algorithm::Sha1, 6, 30, 1_234_567_890).unwrap();
        assert_eq!(reg.get_code_at("A", 1_234_567_890).unwrap(), expected);
        assert_eq!(reg.get_code_at("A", 1_234_567_890).unwrap(), expected);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let (_dir, reg) = fresh();
        assert!(matches!(reg.get_code("nope"), Err(AuthError::NotFound(n)) if n == "nope"));
        assert!(matches!(reg.enrollment("nope"), Err(AuthError::NotFound(_))));
    }

    #[test]
    fn corrupted_entry_fails_per_call_and_stays_listed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("services.json");
        fs::write(
            &path,
            r#"{"good": "otpauth://totp/good?secret=JBSWY3DPEHPK3PXP", "bad": "otpauth://totp/bad?secret=0000"}"#,
        )
        .unwrap();

        let reg = Registry::open(&path);
        assert_eq!(reg.list_names(), vec!["bad", "good"]);
        assert!(reg.get_code("good").is_ok());

        let err = reg.get_code("bad").unwrap_err();
        match err {
            AuthError::CodeGenerationFailed { name, source } => {
                assert_eq!(name, "bad");
                assert!(matches!(*source, AuthError::InvalidSecret(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn enrollment_takes_registry_name() {
        let (_dir, mut reg) = fresh();
        reg.add("Work mail", URI).unwrap();
        let e = reg.enrollment("Work mail").unwrap();
        assert_eq!(e.name, "Work mail");
        assert_eq!(e.label, "TestService");
    }

    #[test]
    fn write_failure_keeps_memory_state() {
        let dir = tempdir().unwrap();
        // a directory where the file should be makes the final rename fail
        let path = dir.path().join("services.json");
        fs::create_dir(&path).unwrap();

        let mut reg = Registry::open(&path);
        let err = reg.add("A", URI).unwrap_err();
        assert!(matches!(err, AuthError::PersistenceFailed { .. }));
        assert_eq!(reg.list_names(), vec!["A"]);
    }

    #[test]
    fn email_scenario() {
        let (_dir, mut reg) = fresh();
        reg.add("Email", "otpauth://totp/Email?secret=JBSWY3DPEHPK3PXP")
            .unwrap();

        let code = reg.get_code("Email").unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        reg.delete("Email").unwrap();
        assert!(matches!(reg.get_code("Email"), Err(AuthError::NotFound(_))));
    }
}
