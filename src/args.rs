/// Splits a raw argument string into tokens, respecting single and double
/// quotes. Quote characters stay in place; only whitespace outside of a
/// quoted span splits. An opposite quote inside an open span is ordinary
/// text, not a nested delimiter.
///
/// `None`, the empty string and the literal string `"null"` all yield an
/// empty token list (configuration layers love handing those over).
///
/// Mandatory extras are appended at the end, each only if not already
/// present by exact match; everything else keeps its order.
pub fn parse_arguments(raw: Option<&str>, mandatory: &[&str]) -> Vec<String> {
    let mut arguments: Vec<String> = Vec::new();

    if let Some(raw) = raw {
        if !raw.is_empty() && raw != "null" {
            let mut current = String::new();
            let mut quote: Option<char> = None;

            for c in raw.chars() {
                if c.is_whitespace() && quote.is_none() {
                    push_argument(&mut current, &mut arguments);
                    continue;
                }
                if c == '"' || c == '\'' {
                    match quote {
                        None => quote = Some(c),
                        Some(open) if open == c => quote = None,
                        // the other kind of quote inside a span is literal
                        Some(_) => {}
                    }
                }
                current.push(c);
            }
            push_argument(&mut current, &mut arguments);
        }
    }

    for extra in mandatory {
        if !arguments.iter().any(|a| a == extra) {
            arguments.push(extra.to_string());
        }
    }

    arguments
}

fn push_argument(current: &mut String, arguments: &mut Vec<String>) {
    if !current.is_empty() {
        arguments.push(std::mem::take(current));
    }
}
