//! 工具文档解析
//!
//! 文档首行是工具的一行描述；`Args:` 段中每个参数以 `name (type): description` 开头（类型可省略），
//! 缩进更深的后续行是上一个参数描述的续行。只有恰好位于条目缩进层级、且匹配条目格式的行才开启新参数，
//! 因此续行里的 `key: value`、括号、冒号都不会被误判。

use std::sync::OnceLock;

use regex::Regex;

/// 文档中的单个参数条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocParam {
    pub name: String,
    /// 括号中的类型注解（去掉 optional 标记后），如 `int`
    pub annotation: Option<String>,
    /// 注解中带 `optional` 标记
    pub optional: bool,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDoc {
    /// 首个非空行
    pub summary: String,
    pub params: Vec<DocParam>,
}

impl ParsedDoc {
    pub fn param(&self, name: &str) -> Option<&DocParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

const ARGS_HEADERS: &[&str] = &["args:", "arguments:", "parameters:", "params:"];

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:\((?P<ann>[^()]*)\))?\s*:(?:\s+(?P<desc>.*)|$)")
            .expect("docstring entry regex")
    })
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// 解析工具文档
pub fn parse_doc(doc: &str) -> ParsedDoc {
    let lines: Vec<&str> = doc.lines().collect();
    let summary = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string();

    let Some(header_idx) = lines
        .iter()
        .position(|l| ARGS_HEADERS.contains(&l.trim().to_lowercase().as_str()))
    else {
        return ParsedDoc {
            summary,
            params: Vec::new(),
        };
    };
    let header_indent = indent_of(lines[header_idx]);

    let mut params: Vec<DocParam> = Vec::new();
    let mut entry_indent: Option<usize> = None;

    for line in &lines[header_idx + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        let indent = indent_of(line);
        // 回到 Args: 的缩进层级（如 Returns:）即段落结束
        if indent <= header_indent {
            break;
        }
        let body = line.trim();
        let base = *entry_indent.get_or_insert(indent);

        if indent == base {
            if let Some(caps) = entry_regex().captures(body) {
                let (annotation, optional) = split_annotation(caps.name("ann").map(|m| m.as_str()));
                params.push(DocParam {
                    name: caps["name"].to_string(),
                    annotation,
                    optional,
                    description: caps
                        .name("desc")
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default(),
                });
                continue;
            }
        }
        // 续行：拼接到上一个参数的描述
        if let Some(last) = params.last_mut() {
            if last.description.is_empty() {
                last.description = body.to_string();
            } else {
                last.description.push(' ');
                last.description.push_str(body);
            }
        }
    }

    ParsedDoc { summary, params }
}

/// `int, optional` → (Some("int"), true)
fn split_annotation(raw: Option<&str>) -> (Option<String>, bool) {
    let Some(raw) = raw else {
        return (None, false);
    };
    let mut optional = false;
    let mut parts = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("optional") {
            optional = true;
        } else {
            parts.push(part);
        }
    }
    let annotation = if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    };
    (annotation, optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_args_section() {
        let doc = "Search the web.\n\nArgs:\n  query (str): the search text.\n  limit (int): max results.";
        let parsed = parse_doc(doc);
        assert_eq!(parsed.summary, "Search the web.");
        assert_eq!(parsed.params.len(), 2);
        assert_eq!(parsed.params[0].name, "query");
        assert_eq!(parsed.params[0].description, "the search text.");
        assert_eq!(parsed.params[0].annotation.as_deref(), Some("str"));
        assert_eq!(parsed.params[1].description, "max results.");
        assert_eq!(parsed.params[1].annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_multiline_and_nested_punctuation() {
        let doc = "\
Fetch a page.

    Args:
        url (str): the address to fetch (must be http: or https:).
            Example: https://example.com/a:b
            note: this line is a continuation, not a param
        headers (dict, optional): extra headers, e.g. {\"a\": \"b\"}.

    Returns:
        page: the body
";
        let parsed = parse_doc(doc);
        assert_eq!(parsed.params.len(), 2);
        let url = parsed.param("url").unwrap();
        assert_eq!(
            url.description,
            "the address to fetch (must be http: or https:). Example: https://example.com/a:b note: this line is a continuation, not a param"
        );
        let headers = parsed.param("headers").unwrap();
        assert!(headers.optional);
        assert_eq!(headers.annotation.as_deref(), Some("dict"));
        assert_eq!(headers.description, "extra headers, e.g. {\"a\": \"b\"}.");
        assert!(parsed.param("page").is_none());
    }

    #[test]
    fn test_description_on_following_line() {
        let doc = "Do it.\nArgs:\n  target:\n      the thing to do it to";
        let parsed = parse_doc(doc);
        assert_eq!(parsed.params[0].name, "target");
        assert_eq!(parsed.params[0].description, "the thing to do it to");
    }

    #[test]
    fn test_no_args_section() {
        let parsed = parse_doc("\n  Returns the current time.\n");
        assert_eq!(parsed.summary, "Returns the current time.");
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn test_url_like_entry_at_base_indent_is_not_a_param() {
        // `http://...` 不匹配条目格式（名称后紧跟 `//`），按续行处理
        let doc = "X.\nArgs:\n  link (str): where to go\n  https://example.com\n";
        let parsed = parse_doc(doc);
        assert_eq!(parsed.params.len(), 1);
        assert_eq!(parsed.params[0].description, "where to go https://example.com");
    }
}
