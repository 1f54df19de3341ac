//! Table names as reported by InnoDB introspection.

use std::fmt;

/// A `schema.table` pair parsed from an `INNODB_BUFFER_PAGE_LRU.TABLE_NAME`
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTable {
    pub schema: String,
    pub table: String,
}

impl QualifiedTable {
    /// Parse the forms InnoDB reports:
    ///
    /// - `` `shop`.`orders` `` (5.7 and later)
    /// - `` `shop`.`orders` /* Partition `p1` */ `` (partitioned tables)
    /// - `shop/orders` and `shop/orders#P#p1` (5.6)
    pub fn parse(raw: &str) -> Option<Self> {
        let name = match raw.find("/*") {
            Some(idx) => raw[..idx].trim(),
            None => raw.trim(),
        };

        if name.starts_with('`') {
            let (schema, rest) = take_quoted(name)?;
            let rest = rest.strip_prefix('.')?;
            let (table, rest) = take_quoted(rest)?;
            if !rest.trim().is_empty() {
                return None;
            }
            return Self::from_parts(schema, table);
        }

        let (schema, table) = name.split_once('/')?;
        let table = match table.find("#P#").or_else(|| table.find("#p#")) {
            Some(idx) => &table[..idx],
            None => table,
        };
        Self::from_parts(schema.to_string(), table.to_string())
    }

    fn from_parts(schema: String, table: String) -> Option<Self> {
        if schema.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self { schema, table })
    }

    /// `` `schema`.`table` `` with identifiers escaped.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Read one backtick-quoted identifier from the front of `input`,
/// returning it unescaped along with the remaining text.
fn take_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('`')?;
    let mut ident = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '`' {
            if matches!(chars.peek(), Some((_, '`'))) {
                ident.push('`');
                chars.next();
                continue;
            }
            return Some((ident, &body[idx + 1..]));
        }
        ident.push(c);
    }
    None
}

/// Quote a MySQL identifier with backticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted() {
        let t = QualifiedTable::parse("`shop`.`orders`").unwrap();
        assert_eq!(t.schema, "shop");
        assert_eq!(t.table, "orders");
        assert_eq!(t.quoted(), "`shop`.`orders`");
    }

    #[test]
    fn test_parse_partition_comment() {
        let t = QualifiedTable::parse("`shop`.`events` /* Partition `p2024` */").unwrap();
        assert_eq!(t.to_string(), "shop.events");
    }

    #[test]
    fn test_parse_escaped_backtick() {
        let t = QualifiedTable::parse("`we``ird`.`t`").unwrap();
        assert_eq!(t.schema, "we`ird");
        assert_eq!(t.quoted(), "`we``ird`.`t`");
    }

    #[test]
    fn test_parse_legacy_slash_form() {
        let t = QualifiedTable::parse("shop/orders#P#p1").unwrap();
        assert_eq!(t.schema, "shop");
        assert_eq!(t.table, "orders");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(QualifiedTable::parse("orders").is_none());
        assert!(QualifiedTable::parse("`shop`").is_none());
        assert!(QualifiedTable::parse("`shop`.`orders").is_none());
        assert!(QualifiedTable::parse("/orders").is_none());
    }
}
