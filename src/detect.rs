// Turns the user's command tokens into the command text plus the set of
// local files it mentions.

use std::collections::HashMap;

use tracing::debug;

use crate::resolve::{FileReference, PathResolver};

/// Characters that can glue a path to an operator, as in `in.txt>out.txt`.
pub const SHELL_SEPARATORS: &[char] = &['|', ';', ',', '>', '<', '&', '='];

/// relativeId -> file. An id is derived from the lexical absolute path
/// alone, so a repeated id always names the same file and re-inserting it
/// is harmless.
pub type FileSet = HashMap<String, FileReference>;

#[derive(Debug, Default)]
pub struct Detection {
    /// Original tokens joined by single spaces.
    pub command: String,
    pub files: FileSet,
}

/// Splits one whitespace-delimited token on runs of shell separators.
/// Never yields empty pieces.
pub fn split_candidates(token: &str) -> impl Iterator<Item = &str> {
    token
        .split(|c: char| SHELL_SEPARATORS.contains(&c))
        .filter(|piece| !piece.is_empty())
}

pub fn command_text<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn detect_files<S: AsRef<str>>(tokens: &[S], resolver: &PathResolver) -> Detection {
    let mut detection = Detection {
        command: command_text(tokens),
        ..Default::default()
    };

    for candidate in tokens.iter().flat_map(|t| split_candidates(t.as_ref())) {
        let Some(file) = resolver.resolve(candidate) else {
            continue;
        };
        debug!(candidate, id = %file.relative_id, "file reference");
        detection.files.insert(file.relative_id.clone(), file);
    }

    detection
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sandbox(files: &[&str]) -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        for f in files {
            let p = dir.path().join(f);
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(p, f.as_bytes()).unwrap();
        }
        let resolver = PathResolver::new(dir.path(), dir.path());
        (dir, resolver)
    }

    #[test]
    fn split_on_separator_runs() {
        let pieces: Vec<_> = split_candidates("a.txt>>b.txt|c;;d,e<f&g=h").collect();
        assert_eq!(pieces, vec!["a.txt", "b.txt", "c", "d", "e", "f", "g", "h"]);
    }

    #[test]
    fn separators_only_yield_nothing() {
        assert_eq!(split_candidates("|;,><&=").count(), 0);
        let (_dir, resolver) = sandbox(&[]);
        let d = detect_files(&["|;,><&=", "&&", ">"], &resolver);
        assert!(d.files.is_empty());
        assert_eq!(d.command, "|;,><&= && >");
    }

    #[test]
    fn glued_redirect_scenario() {
        let (dir, resolver) = sandbox(&["hello.txt"]);
        let d = detect_files(&["echo", "hello.txt>out.txt"], &resolver);

        assert_eq!(d.command, "echo hello.txt>out.txt");
        assert_eq!(d.files.len(), 1);
        let file = &d.files["hello.txt"];
        assert_eq!(
            file.absolute_path,
            crate::resolve::normalize(&dir.path().join("hello.txt"))
        );
    }

    #[test]
    fn command_text_is_verbatim() {
        let (_dir, resolver) = sandbox(&["in.csv"]);
        let tokens = ["sort", "-t,", "-k2", "in.csv|head", "-n", "3"];
        let d = detect_files(&tokens, &resolver);
        assert_eq!(d.command, "sort -t, -k2 in.csv|head -n 3");
        assert!(d.files.contains_key("in.csv"));
    }

    #[test]
    fn key_value_argument_finds_the_path() {
        let (_dir, resolver) = sandbox(&["conf/app.toml"]);
        let d = detect_files(&["run", "--config=conf/app.toml"], &resolver);
        assert_eq!(d.files.keys().collect::<Vec<_>>(), vec!["conf/app.toml"]);
        assert!(d.files["conf/app.toml"].relative_id.starts_with("conf"));
    }

    #[test]
    fn repeated_file_is_one_reference() {
        let (dir, resolver) = sandbox(&["x.txt"]);
        let d = detect_files(&["cat", "x.txt", "./x.txt", "x.txt>y"], &resolver);
        assert_eq!(d.files.len(), 1);
        let file = &d.files["x.txt"];
        assert_eq!(
            file.absolute_path,
            crate::resolve::normalize(&dir.path().join("x.txt"))
        );
    }

    #[test]
    fn ordinary_words_are_ignored() {
        let (_dir, resolver) = sandbox(&[]);
        let d = detect_files(&["echo", "Hello", "World"], &resolver);
        assert!(d.files.is_empty());
        assert_eq!(d.command, "echo Hello World");
    }

    #[test]
    fn no_identifier_starts_with_parent_segment() {
        let outer = TempDir::new().unwrap();
        fs::create_dir_all(outer.path().join("root")).unwrap();
        fs::write(outer.path().join("root/in.txt"), "in").unwrap();
        fs::write(outer.path().join("out.txt"), "out").unwrap();
        let root = outer.path().join("root");
        let resolver = PathResolver::new(&root, &root);

        let d = detect_files(&["cat", "in.txt", "../out.txt"], &resolver);
        assert_eq!(d.files.len(), 1);
        assert!(d.files.keys().all(|k| !k.starts_with("../") && k != ".."));
    }
}
