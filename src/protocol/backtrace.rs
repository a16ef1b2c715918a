use serde_json::Value;

/// One step into the originating term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Positional index into the term's argument list.
    Pos(usize),
    /// Named key in the term's options object.
    Opt(String),
}

/// Ordered path from the term root down to the failing subterm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace(Vec<Frame>);

impl Backtrace {
    /// Parse the `b` field of an error response. Integers become positional
    /// frames, strings become option-key frames; parsing stops at the first
    /// element that is neither, leaving a prefix that still resolves.
    pub fn parse(field: Option<&Value>) -> Self {
        let Some(Value::Array(items)) = field else {
            return Self::default();
        };
        let mut frames = Vec::with_capacity(items.len());
        for item in items {
            if let Some(index) = item.as_u64() {
                frames.push(Frame::Pos(index as usize));
            } else if let Some(key) = item.as_str() {
                frames.push(Frame::Opt(key.to_string()));
            } else {
                break;
            }
        }
        Self(frames)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Frame>> for Backtrace {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}

/// Render `term` with `HERE(...)` wrapped around the subterm the frames
/// select.
///
/// A term is a `[type, args]` or `[type, args, opts]` array; a `Pos` frame
/// descends into `args`, an `Opt` frame into `opts`. An unresolvable frame
/// leaves the term unannotated.
pub fn annotate(term: &Value, frames: &[Frame]) -> String {
    let mut out = String::new();
    write_annotated(term, frames, &mut out);
    out
}

fn write_annotated(term: &Value, frames: &[Frame], out: &mut String) {
    let Some((frame, rest)) = frames.split_first() else {
        out.push_str("HERE(");
        out.push_str(&term.to_string());
        out.push(')');
        return;
    };

    if !resolvable(term, frame) {
        out.push_str(&term.to_string());
        return;
    }
    let Some(parts) = term.as_array() else {
        out.push_str(&term.to_string());
        return;
    };

    out.push('[');
    for (position, part) in parts.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        match (position, frame) {
            (1, Frame::Pos(index)) => write_args(part, *index, rest, out),
            (2, Frame::Opt(key)) => write_opts(part, key, rest, out),
            _ => out.push_str(&part.to_string()),
        }
    }
    out.push(']');
}

fn resolvable(term: &Value, frame: &Frame) -> bool {
    let Some(parts) = term.as_array() else {
        return false;
    };
    match frame {
        Frame::Pos(index) => parts
            .get(1)
            .and_then(Value::as_array)
            .is_some_and(|args| *index < args.len()),
        Frame::Opt(key) => parts
            .get(2)
            .and_then(Value::as_object)
            .is_some_and(|opts| opts.contains_key(key)),
    }
}

fn write_args(args: &Value, index: usize, rest: &[Frame], out: &mut String) {
    let Some(args) = args.as_array() else {
        out.push_str(&args.to_string());
        return;
    };
    out.push('[');
    for (position, arg) in args.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        if position == index {
            write_annotated(arg, rest, out);
        } else {
            out.push_str(&arg.to_string());
        }
    }
    out.push(']');
}

fn write_opts(opts: &Value, key: &str, rest: &[Frame], out: &mut String) {
    let Some(opts) = opts.as_object() else {
        out.push_str(&opts.to_string());
        return;
    };
    out.push('{');
    for (position, (name, value)) in opts.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        out.push('"');
        out.push_str(name);
        out.push_str("\": ");
        if name == key {
            write_annotated(value, rest, out);
        } else {
            out.push_str(&value.to_string());
        }
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_mixed_frames() {
        let backtrace = Backtrace::parse(Some(&json!([0, "index", 2])));
        assert_eq!(
            backtrace.frames(),
            &[Frame::Pos(0), Frame::Opt("index".to_string()), Frame::Pos(2)]
        );
    }

    #[test]
    fn parse_stops_at_a_non_conforming_element() {
        let backtrace = Backtrace::parse(Some(&json!([0, [1], 2])));
        assert_eq!(backtrace.frames(), &[Frame::Pos(0)]);
    }

    #[test]
    fn parse_missing_field() {
        assert!(Backtrace::parse(None).is_empty());
        assert!(Backtrace::parse(Some(&json!({"not": "an array"}))).is_empty());
    }

    #[test]
    fn empty_path_wraps_the_whole_term() {
        let term = json!([24, [1, 0], {}]);
        assert_eq!(annotate(&term, &[]), "HERE([24,[1,0],{}])");
    }

    #[test]
    fn positional_frame_selects_an_argument() {
        let term = json!([24, [1, 0], {}]);
        assert_eq!(annotate(&term, &[Frame::Pos(1)]), "[24, [1, HERE(0)], {}]");
    }

    #[test]
    fn nested_positional_frames() {
        let term = json!([24, [[10, [1, 2]], 3], {}]);
        assert_eq!(
            annotate(&term, &[Frame::Pos(0), Frame::Pos(1)]),
            "[24, [[10, [1, HERE(2)]], 3], {}]"
        );
    }

    #[test]
    fn option_frame_selects_an_option_value() {
        let term = json!([39, [[15, ["users"]]], {"index": [17, ["age"]]}]);
        assert_eq!(
            annotate(&term, &[Frame::Opt("index".to_string())]),
            r#"[39, [[15,["users"]]], {"index": HERE([17,["age"]])}]"#
        );
    }

    #[test]
    fn unresolvable_frame_leaves_the_term_unannotated() {
        let term = json!([24, [1, 0], {}]);
        assert_eq!(annotate(&term, &[Frame::Pos(5)]), "[24,[1,0],{}]");
        assert_eq!(annotate(&term, &[Frame::Opt("index".to_string())]), "[24,[1,0],{}]");
        assert_eq!(annotate(&json!(42), &[Frame::Pos(0)]), "42");
    }
}
