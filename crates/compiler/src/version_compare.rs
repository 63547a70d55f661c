//! RPM-style version comparison (spec glossary "Version comparison").
//!
//! Each operand is split into alternating digit-runs and alpha-runs (any
//! other character, `.`/`-`/`~`, is a pure separator); runs are compared
//! element-wise, digit-runs numerically and alpha-runs lexicographically,
//! with a digit-run always outranking an alpha-run at the same position.
//! A longer operand wins once every shared position compares equal.

use std::cmp::Ordering;

use buildgraph_core::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Num(u64),
    Alpha(String),
}

fn split(s: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut run = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    run.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            segments.push(Segment::Num(run.parse().unwrap_or(0)));
        } else if c.is_ascii_alphabetic() {
            let mut run = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphabetic() {
                    run.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            segments.push(Segment::Alpha(run));
        } else {
            chars.next();
        }
    }
    segments
}

fn cmp_segment(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Num(x), Segment::Num(y)) => x.cmp(y),
        (Segment::Alpha(x), Segment::Alpha(y)) => x.cmp(y),
        (Segment::Num(_), Segment::Alpha(_)) => Ordering::Greater,
        (Segment::Alpha(_), Segment::Num(_)) => Ordering::Less,
    }
}

pub fn compare(a: &str, b: &str) -> Ordering {
    let sa = split(a);
    let sb = split(b);
    for i in 0..sa.len().max(sb.len()) {
        match (sa.get(i), sb.get(i)) {
            (Some(x), Some(y)) => {
                let ord = cmp_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
    Ordering::Equal
}

fn parse_spec(spec: &str) -> (&str, &str) {
    for op in [">=", "<=", "==", "!=", ">", "<"] {
        if let Some(rest) = spec.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("==", spec.trim())
}

/// `version.version_compare(spec)` (spec §4.D): `spec` is an optional
/// comparison operator (`>=`, `<=`, `==`, `!=`, `>`, `<`; bare implies
/// `==`) followed by the operand to compare against.
pub fn version_compare(version: &str, spec: &str) -> Result<bool, CompileError> {
    let (op, rhs) = parse_spec(spec);
    let ord = compare(version, rhs);
    Ok(match op {
        ">=" => ord != Ordering::Less,
        "<=" => ord != Ordering::Greater,
        ">" => ord == Ordering::Greater,
        "<" => ord == Ordering::Less,
        "==" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        _ => return Err(CompileError::meson(format!("unknown version comparator in '{spec}'"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically_not_lexically() {
        assert_eq!(compare("1.9", "1.10"), Ordering::Less);
    }

    #[test]
    fn digit_run_outranks_alpha_run_at_same_position() {
        assert_eq!(compare("1.0", "1.0rc1"), Ordering::Greater);
    }

    #[test]
    fn longer_operand_wins_when_shared_positions_equal() {
        assert_eq!(compare("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn equal_versions_compare_equal() {
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn alpha_runs_compare_lexicographically() {
        assert_eq!(compare("1.0a", "1.0b"), Ordering::Less);
    }

    #[test]
    fn version_compare_handles_every_operator() {
        assert!(version_compare("2.0", ">=1.0").unwrap());
        assert!(version_compare("1.0", "<=1.0").unwrap());
        assert!(version_compare("2.0", ">1.0").unwrap());
        assert!(version_compare("0.9", "<1.0").unwrap());
        assert!(version_compare("1.0", "==1.0").unwrap());
        assert!(version_compare("1.0", "!=1.1").unwrap());
        assert!(version_compare("1.0", "1.0").unwrap());
    }

    #[test]
    fn release_style_strings_compare_sensibly() {
        assert_eq!(compare("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.0"), Ordering::Greater);
    }
}
