//! The line-oriented test-manifest format (spec §4.H): serialize the
//! backend's `TestCase` list to the `BEGIN_TEST`/`END_TEST` block format a
//! separate test runner consumes, and deserialize it back.

use buildgraph_core::CompileError;

use crate::backend::TestCase;

const SERIAL_VERSION: u32 = 0;

fn join_arguments(args: &[String]) -> String {
    args.join("|")
}

fn split_arguments(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('|').map(str::to_string).collect()
    }
}

/// Renders `tests` as the `SERIAL_VERSION` header followed by one
/// `BEGIN_TEST`/`END_TEST` block per entry, in list order.
pub fn serialize(tests: &[TestCase]) -> String {
    let mut out = format!("SERIAL_VERSION:{SERIAL_VERSION}\n");
    for test in tests {
        out.push_str("BEGIN_TEST\n");
        out.push_str(&format!("  name:{}\n", test.name));
        out.push_str(&format!("  exe:{}\n", test.exe));
        out.push_str(&format!("  arguments:{}\n", join_arguments(&test.arguments)));
        out.push_str(&format!("  xfail:{}\n", if test.should_fail { 1 } else { 0 }));
        out.push_str("END_TEST\n");
    }
    out
}

fn parse_field<'a>(line: &'a str, key: &str) -> Result<&'a str, CompileError> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix(&format!("{key}:")) else {
        return Err(CompileError::meson(format!(
            "malformed test manifest: expected '{key}:...', got '{trimmed}'"
        )));
    };
    Ok(rest)
}

/// Parses the manifest format back into a `TestCase` list. Rejects a
/// missing/mismatched `SERIAL_VERSION` header and any unrecognized key
/// inside a test block (spec §4.H: "unknown keys fail loudly").
pub fn deserialize(text: &str) -> Result<Vec<TestCase>, CompileError> {
    let mut lines = text.lines();

    let header = lines
        .next()
        .ok_or_else(|| CompileError::meson("malformed test manifest: empty file"))?;
    let version_str = parse_field(header, "SERIAL_VERSION")?;
    let version: u32 = version_str
        .parse()
        .map_err(|_| CompileError::meson(format!("malformed test manifest: bad SERIAL_VERSION '{version_str}'")))?;
    if version != SERIAL_VERSION {
        return Err(CompileError::meson(format!(
            "test manifest SERIAL_VERSION {version} does not match expected {SERIAL_VERSION}"
        )));
    }

    let mut tests = Vec::new();
    loop {
        let Some(line) = lines.next() else { break };
        if line.trim().is_empty() {
            continue;
        }
        if line.trim() != "BEGIN_TEST" {
            return Err(CompileError::meson(format!(
                "malformed test manifest: expected 'BEGIN_TEST', got '{}'",
                line.trim()
            )));
        }

        let mut name = None;
        let mut exe = None;
        let mut arguments = None;
        let mut xfail = None;
        loop {
            let line = lines
                .next()
                .ok_or_else(|| CompileError::meson("malformed test manifest: unterminated test block"))?;
            let trimmed = line.trim();
            if trimmed == "END_TEST" {
                break;
            }
            let (key, rest) = trimmed
                .split_once(':')
                .ok_or_else(|| CompileError::meson(format!("malformed test manifest line '{trimmed}'")))?;
            match key {
                "name" => name = Some(rest.to_string()),
                "exe" => exe = Some(rest.to_string()),
                "arguments" => arguments = Some(split_arguments(rest)),
                "xfail" => {
                    xfail = Some(match rest {
                        "0" => false,
                        "1" => true,
                        other => {
                            return Err(CompileError::meson(format!(
                                "malformed test manifest: xfail must be 0 or 1, got '{other}'"
                            )))
                        }
                    })
                }
                other => {
                    return Err(CompileError::meson(format!(
                        "malformed test manifest: unknown key '{other}'"
                    )))
                }
            }
        }

        tests.push(TestCase {
            name: name.ok_or_else(|| CompileError::meson("test block missing 'name'"))?,
            exe: exe.ok_or_else(|| CompileError::meson("test block missing 'exe'"))?,
            arguments: arguments.unwrap_or_default(),
            should_fail: xfail.ok_or_else(|| CompileError::meson("test block missing 'xfail'"))?,
        });
    }
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestCase {
        TestCase {
            name: "foo".to_string(),
            exe: "/foo".to_string(),
            arguments: vec!["a".to_string(), "/b/c".to_string(), "d".to_string()],
            should_fail: false,
        }
    }

    #[test]
    fn serialize_matches_the_literal_example() {
        let rendered = serialize(&[sample()]);
        assert_eq!(
            rendered,
            "SERIAL_VERSION:0\nBEGIN_TEST\n  name:foo\n  exe:/foo\n  arguments:a|/b/c|d\n  xfail:0\nEND_TEST\n"
        );
    }

    #[test]
    fn round_trips_through_serialize_and_deserialize() {
        let tests = vec![
            sample(),
            TestCase {
                name: "bar".to_string(),
                exe: "./bar".to_string(),
                arguments: Vec::new(),
                should_fail: true,
            },
        ];
        let rendered = serialize(&tests);
        let parsed = deserialize(&rendered).unwrap();
        assert_eq!(parsed, tests);
    }

    #[test]
    fn deserialize_rejects_mismatched_serial_version() {
        let text = "SERIAL_VERSION:99\nBEGIN_TEST\n  name:x\n  exe:x\n  arguments:\n  xfail:0\nEND_TEST\n";
        assert!(deserialize(text).is_err());
    }

    #[test]
    fn deserialize_rejects_unknown_key() {
        let text = "SERIAL_VERSION:0\nBEGIN_TEST\n  name:x\n  exe:x\n  bogus:1\n  xfail:0\nEND_TEST\n";
        assert!(deserialize(text).is_err());
    }

    #[test]
    fn empty_test_list_serializes_to_just_the_header() {
        assert_eq!(serialize(&[]), "SERIAL_VERSION:0\n");
    }
}
