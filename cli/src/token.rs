//! The token file keeps a login across invocations.

use std::io::ErrorKind;
use std::path::Path;

pub fn load(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn save(path: &Path, token: &str) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", token))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

pub fn clear(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("spc-token-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn save_load_clear() {
        let path = temp_path();
        assert_eq!(load(&path).unwrap(), None);

        save(&path, "abc123").unwrap();
        assert_eq!(load(&path).unwrap().as_deref(), Some("abc123"));

        clear(&path).unwrap();
        assert_eq!(load(&path).unwrap(), None);
        clear(&path).unwrap();
    }

    #[test]
    fn blank_file_is_no_token() {
        let path = temp_path();
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(load(&path).unwrap(), None);
        clear(&path).unwrap();
    }
}
