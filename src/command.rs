//! POSIX `sh` command text for fragment writes, reassembly and cleanup
//!
//! Fragments live at `<temp_dir>/blitcp-<token>-<index>.tmp`. The token is a
//! dash-free hex string, so the index is always the text after the last `-`.

use uuid::Uuid;

const FRAGMENT_PREFIX: &str = "blitcp";
const FRAGMENT_SUFFIX: &str = ".tmp";

/// Quote a string as one single-quoted `sh` word.
pub fn sh_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Command templates bound to one run's token and temp directory
#[derive(Debug, Clone)]
pub struct ScriptTemplate {
    temp_dir: String,
    token: String,
}

impl ScriptTemplate {
    pub fn new(temp_dir: impl Into<String>, token: impl Into<String>) -> Self {
        let temp_dir = temp_dir.into();
        let trimmed = temp_dir.trim_end_matches('/');
        let temp_dir = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            temp_dir,
            token: token.into(),
        }
    }

    /// Fresh template with a random run token.
    pub fn with_random_token(temp_dir: impl Into<String>) -> Self {
        Self::new(temp_dir, Uuid::new_v4().simple().to_string())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn join(&self, name: &str) -> String {
        if self.temp_dir == "/" {
            format!("/{name}")
        } else {
            format!("{}/{}", self.temp_dir, name)
        }
    }

    /// Temporary path for fragment `index`.
    pub fn fragment_path(&self, index: usize) -> String {
        self.join(&format!(
            "{FRAGMENT_PREFIX}-{}-{index}{FRAGMENT_SUFFIX}",
            self.token
        ))
    }

    /// Glob matching every fragment of this run, unquoted.
    pub fn fragment_glob(&self) -> String {
        self.join(&format!("{FRAGMENT_PREFIX}-{}-*{FRAGMENT_SUFFIX}", self.token))
    }

    /// Overwrite (never append) `path` with `content`.
    pub fn write_chunk(&self, path: &str, content: &str) -> String {
        format!("printf '%s' '{}' > {}", content, sh_quote(path))
    }

    /// Length of the write command for `path` with an empty body.
    pub fn write_overhead(&self, path: &str) -> usize {
        self.write_chunk(path, "").len()
    }

    /// Concatenate this run's fragments in numeric index order, decode them
    /// through `decode`, and write the result to `destination`.
    pub fn assemble(&self, destination: &str, decode: &str) -> String {
        let dir = sh_quote(&self.temp_dir);
        let pattern = format!("{FRAGMENT_PREFIX}-{}-*{FRAGMENT_SUFFIX}", self.token);
        let dest = sh_quote(destination);
        format!(
            r#"set -e
dest={dest}
mkdir -p "$(dirname "$dest")"
rm -f "$dest"
frags=$(for f in {dir}/{pattern}; do
  [ -e "$f" ] || continue
  i=${{f##*-}}
  printf '%s %s\n' "${{i%{FRAGMENT_SUFFIX}}}" "$f"
done | sort -n -k1,1 | cut -d' ' -f2-)
if [ -z "$frags" ]; then
  : > "$dest"
else
  printf '%s\n' "$frags" | while IFS= read -r f; do cat "$f"; done | {decode} > "$dest"
fi
"#
        )
    }

    /// Remove every fragment of this run; missing files are not an error.
    pub fn cleanup(&self) -> String {
        let pattern = format!("{FRAGMENT_PREFIX}-{}-*{FRAGMENT_SUFFIX}", self.token);
        format!("rm -f {}/{}", sh_quote(&self.temp_dir), pattern)
    }
}

/// Index embedded in a fragment file name, if it is one.
pub fn fragment_index(path: &str) -> Option<usize> {
    let name = path.rsplit('/').next()?;
    let stem = name.strip_suffix(FRAGMENT_SUFFIX)?;
    if !stem.starts_with(FRAGMENT_PREFIX) {
        return None;
    }
    stem.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sh_quote() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
        assert_eq!(sh_quote(""), "''");
    }

    #[test]
    fn test_fragment_paths() {
        let t = ScriptTemplate::new("/var/tmp/", "abc123");
        assert_eq!(t.fragment_path(0), "/var/tmp/blitcp-abc123-0.tmp");
        assert_eq!(t.fragment_path(12), "/var/tmp/blitcp-abc123-12.tmp");
        assert_eq!(t.fragment_glob(), "/var/tmp/blitcp-abc123-*.tmp");

        let root = ScriptTemplate::new("/", "t");
        assert_eq!(root.fragment_path(1), "/blitcp-t-1.tmp");
    }

    #[test]
    fn test_random_token_has_no_dashes() {
        let t = ScriptTemplate::with_random_token("/tmp");
        assert_eq!(t.token().len(), 32);
        assert!(!t.token().contains('-'));
        assert_ne!(t.token(), ScriptTemplate::with_random_token("/tmp").token());
    }

    #[test]
    fn test_fragment_index_is_numeric() {
        let t = ScriptTemplate::new("/tmp/with-dash", "ff00");
        let mut paths: Vec<String> = (0..12).rev().map(|i| t.fragment_path(i)).collect();
        paths.sort_by_key(|p| fragment_index(p));
        let order: Vec<usize> = paths.iter().filter_map(|p| fragment_index(p)).collect();
        assert_eq!(order, (0..12).collect::<Vec<_>>());
        assert_eq!(fragment_index("/tmp/other.txt"), None);
    }

    #[test]
    fn test_write_overhead_matches_command() {
        let t = ScriptTemplate::new("/tmp", "tok");
        let path = t.fragment_path(3);
        let cmd = t.write_chunk(&path, "QUJD");
        assert_eq!(cmd.len(), t.write_overhead(&path) + 4);
        assert!(cmd.ends_with("> '/tmp/blitcp-tok-3.tmp'"));
        assert!(!cmd.contains(">>"));
    }

    #[test]
    fn test_assemble_sorts_numerically() {
        let t = ScriptTemplate::new("/tmp", "tok");
        let script = t.assemble("/opt/out file", "base64 -d");
        assert!(script.contains("dest='/opt/out file'"));
        assert!(script.contains("sort -n -k1,1"));
        assert!(script.contains("| base64 -d > \"$dest\""));
        assert!(script.contains("'/tmp'/blitcp-tok-*.tmp"));
    }

    #[test]
    fn test_cleanup_targets_only_this_run() {
        let t = ScriptTemplate::new("/tmp", "tok");
        assert_eq!(t.cleanup(), "rm -f '/tmp'/blitcp-tok-*.tmp");
    }
}
