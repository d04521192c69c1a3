// src/utils/html.rs

/// Strips dangerous markup from user supplied text (course descriptions,
/// question and option content) with ammonia's whitelist, then trims it.
///
/// Quiz text ends up rendered in every audience member's browser, so this
/// runs before anything is stored.
pub fn clean_text(input: &str) -> String {
    ammonia::clean(input).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_removed() {
        assert_eq!(clean_text("<b>2 + 2</b><script>alert(1)</script>"), "<b>2 + 2</b>");
    }

    #[test]
    fn test_plain_text_kept() {
        assert_eq!(clean_text("  What is ownership?  "), "What is ownership?");
    }
}
