//! `${path}` / `%{path}` expansion against a JSON context.
//!
//! A path is a `.`-separated list of keys, each optionally followed by one or
//! more bracketed array indices: `array[0].items[2].name`. Anything that does
//! not resolve renders as `<MISSING:path>` rather than failing, so a rendered
//! template always comes back as text.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
enum TemplateNode<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
    InvalidIndex,
}

/// Expands every placeholder in `template` against `context`.
///
/// Resolved values are substituted once; text produced by a substitution is
/// never scanned again.
pub fn expand(template: &str, context: &Value) -> String {
    if template.is_empty() {
        return String::new();
    }

    let mut output = String::with_capacity(template.len());
    for node in tokenize(template) {
        match node {
            TemplateNode::Literal(text) => output.push_str(text),
            TemplateNode::Placeholder(path) => match resolve_path(context, path) {
                Some(value) => output.push_str(&render_value(value)),
                None => {
                    output.push_str("<MISSING:");
                    output.push_str(path);
                    output.push('>');
                }
            },
        }
    }
    output
}

/// Expands every string leaf of a JSON tree, keeping its shape.
pub fn expand_value(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(text) => Value::String(expand(text, context)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| expand_value(item, context)).collect())
        }
        Value::Object(fields) => Value::Object(
            fields.iter().map(|(key, value)| (key.clone(), expand_value(value, context))).collect(),
        ),
        other => other.clone(),
    }
}

/// Walks `path` through `context`, returning `None` as soon as a step does not apply.
pub fn resolve_path<'v>(context: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = context;
    for segment in parse_path(path) {
        current = match segment {
            PathSegment::Key(key) => current.as_object()?.get(key)?,
            PathSegment::Index(index) => current.as_array()?.get(index)?,
            PathSegment::InvalidIndex => return None,
        };
    }
    Some(current)
}

/// Default text form of a resolved value: strings raw, everything else as JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn tokenize(template: &str) -> Vec<TemplateNode<'_>> {
    let bytes = template.as_bytes();
    let mut nodes = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while cursor + 1 < bytes.len() {
        let opens = matches!(bytes[cursor], b'$' | b'%') && bytes[cursor + 1] == b'{';
        if !opens {
            cursor += 1;
            continue;
        }

        let path_start = cursor + 2;
        let Some(close_offset) = template[path_start..].find('}') else {
            break;
        };
        let path_end = path_start + close_offset;

        if literal_start < cursor {
            nodes.push(TemplateNode::Literal(&template[literal_start..cursor]));
        }
        nodes.push(TemplateNode::Placeholder(&template[path_start..path_end]));

        cursor = path_end + 1;
        literal_start = cursor;
    }

    if literal_start < template.len() {
        nodes.push(TemplateNode::Literal(&template[literal_start..]));
    }
    nodes
}

fn parse_path(path: &str) -> Vec<PathSegment<'_>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(bracket) => (&part[..bracket], &part[bracket..]),
            None => (part, ""),
        };

        if !key.is_empty() || rest.is_empty() {
            segments.push(PathSegment::Key(key));
        }

        while !rest.is_empty() {
            let parsed = rest
                .strip_prefix('[')
                .and_then(|inner| inner.split_once(']'))
                .and_then(|(index, tail)| index.parse::<usize>().ok().map(|index| (index, tail)));

            match parsed {
                Some((index, tail)) => {
                    segments.push(PathSegment::Index(index));
                    rest = tail;
                }
                None => {
                    segments.push(PathSegment::InvalidIndex);
                    break;
                }
            }
        }
    }

    segments
}
