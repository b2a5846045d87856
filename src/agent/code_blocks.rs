const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// All triple-backtick blocks in `text`, in order. A fence is closed by the
/// next fence; an unmatched opening fence is ignored.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        blocks.push(parse_block(&after_open[..close]));
        rest = &after_open[close + FENCE.len()..];
    }

    blocks
}

pub fn first_code_block(text: &str) -> Option<CodeBlock> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let close = after_open.find(FENCE)?;
    Some(parse_block(&after_open[..close]))
}

fn parse_block(inner: &str) -> CodeBlock {
    let inner = inner.replace("\r\n", "\n");
    let (language, body) = match inner.split_once('\n') {
        Some((first, body)) if is_info_string(first) => {
            let tag = first.trim();
            let language = (!tag.is_empty()).then(|| tag.to_ascii_lowercase());
            (language, body)
        }
        _ => (None, inner.as_str()),
    };

    CodeBlock {
        language,
        code: body.trim_end_matches('\n').to_string(),
    }
}

// A language tag such as `python`, `sh` or `c++`; anything else on the
// fence line is treated as code.
fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '_' | '.' | '#'))
}
