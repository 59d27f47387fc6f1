//! Identifier quoting for generated SQL.
//!
//! The engine necessarily builds SQL text out of catalog metadata. Values are
//! always bound parameters; identifiers cannot be bound, so every table or
//! column name that reaches generated SQL goes through [`quote_ident`].

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn quote_idents<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name of the generated raw view for a table.
pub(crate) fn raw_view_name(table: &str) -> String {
    format!("{table}_raw")
}

/// Name of the generated formatted view for a table.
pub(crate) fn formatted_view_name(table: &str) -> String {
    format!("{table}_formatted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_wrapped() {
        assert_eq!(quote_ident("employee"), "\"employee\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            quote_ident("x\"; DROP TABLE y; --"),
            "\"x\"\"; DROP TABLE y; --\""
        );
    }

    #[test]
    fn lists_are_comma_joined() {
        assert_eq!(quote_idents(["a", "b"]), "\"a\", \"b\"");
    }
}
