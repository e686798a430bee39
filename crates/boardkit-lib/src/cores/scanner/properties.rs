//! `key=value` property files (`platform.txt`, `boards.txt`).

use crate::cores::catalog::Board;
use crate::cores::error::ScanError;
use std::collections::BTreeMap;
use std::path::Path;

pub type Properties = BTreeMap<String, String>;

/// Parse property text. Blank lines and `#` comments are skipped; any other
/// line must contain `=` with a non-empty key.
pub fn parse_properties(text: &str, origin: &Path) -> Result<Properties, ScanError> {
    let mut props = Properties::new();
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = |reason: &str| ScanError::MalformedProperties {
            path: origin.to_path_buf(),
            line: idx + 1,
            reason: reason.to_string(),
        };
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| malformed("invalid line format, should be 'key=value'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed("empty key"));
        }
        props.insert(key.to_string(), value.trim().to_string());
    }
    Ok(props)
}

/// Load a property file if it exists. `Ok(None)` when absent.
pub fn load_optional(path: &Path) -> Result<Option<Properties>, ScanError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8(bytes).map_err(|e| ScanError::MalformedProperties {
                path: path.to_path_buf(),
                line: 0,
                reason: format!("not valid UTF-8: {}", e),
            })?;
            parse_properties(&text, path).map(Some)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Boards declared in `boards.txt`: every `<id>.name` entry, ordered by id.
pub fn boards_from_properties(props: &Properties) -> Vec<Board> {
    props
        .iter()
        .filter_map(|(key, value)| {
            let (id, field) = key.split_once('.')?;
            (field == "name" && id != "menu").then(|| Board {
                name: value.clone(),
                id: Some(id.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_values_and_comments() {
        let text = "\u{feff}# comment\nname=Arduino AVR Boards\n\nversion = 1.8.3\ncompiler.path={runtime.tools.avr-gcc.path}/bin/\nrecipe.c.o.pattern=\"{compiler.path}\" -c\n";
        let props = parse_properties(text, Path::new("platform.txt")).unwrap();
        assert_eq!(props["name"], "Arduino AVR Boards");
        assert_eq!(props["version"], "1.8.3");
        assert_eq!(props["compiler.path"], "{runtime.tools.avr-gcc.path}/bin/");
        assert_eq!(props["recipe.c.o.pattern"], "\"{compiler.path}\" -c");
    }

    #[test]
    fn rejects_line_without_separator() {
        let err = parse_properties("name=ok\nthis is broken\n", Path::new("platform.txt")).unwrap_err();
        match err {
            ScanError::MalformedProperties { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_optional(&dir.path().join("platform.txt")).unwrap().is_none());
    }

    #[test]
    fn boards_are_first_level_names() {
        let text = "menu.cpu=Processor\nuno.name=Arduino Uno\nuno.upload.tool=avrdude\nmega.name=Arduino Mega\nmega.menu.cpu.atmega2560=ATmega2560\n";
        let props = parse_properties(text, Path::new("boards.txt")).unwrap();
        let boards = boards_from_properties(&props);
        let names: Vec<&str> = boards.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Arduino Mega", "Arduino Uno"]);
        assert_eq!(boards[1].id.as_deref(), Some("uno"));
    }
}
