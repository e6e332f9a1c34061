use super::schema::ColumnType;
use super::value::SqlValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Comparison operators available in filter conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
}

impl Comparison {
    /// Returns the SQL operator.
    #[must_use]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Escape character declared on every rendered `LIKE`.
pub const LIKE_ESCAPE: char = '\\';

/// A text-rendering convention for SQL.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Returns the dialect's kind.
    fn kind(&self) -> DialectKind;

    /// Quotes a table or column name.
    fn quote(&self, identifier: &str) -> String;

    /// Renders a boolean literal.
    fn bool_literal(&self, value: bool) -> String;

    /// Renders a timestamp literal.
    fn timestamp_literal(&self, at: DateTime<Utc>) -> String;

    /// Renders a binary literal.
    fn bytes_literal(&self, bytes: &[u8]) -> String;

    /// Renders a string literal with quotes doubled.
    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Renders any value as a literal.
    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => self.bool_literal(*v),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Text(v) => self.string_literal(v),
            SqlValue::Uuid(v) => self.string_literal(&v.hyphenated().to_string()),
            SqlValue::Timestamp(v) => self.timestamp_literal(*v),
            SqlValue::Bytes(v) => self.bytes_literal(v),
        }
    }

    /// Renders one `WHERE` condition.
    fn comparison(&self, column: &str, op: Comparison, value: &SqlValue) -> String {
        format!("{} {} {}", self.quote(column), op.operator(), self.literal(value))
    }

    /// Returns the characters `LIKE` treats as wildcards besides the escape.
    fn like_wildcards(&self) -> &'static [char] {
        &['%', '_']
    }

    /// Renders a `*` pattern as a `LIKE` condition.
    ///
    /// Only `*` matches more than itself: the dialect's own wildcards and the
    /// escape character are escaped with [`LIKE_ESCAPE`].
    fn like(&self, column: &str, pattern: &str) -> String {
        let wildcards = self.like_wildcards();
        let mut escaped = String::with_capacity(pattern.len() + 4);
        for c in pattern.chars() {
            if c == '*' {
                escaped.push('%');
            } else {
                if c == LIKE_ESCAPE || wildcards.contains(&c) {
                    escaped.push(LIKE_ESCAPE);
                }
                escaped.push(c);
            }
        }
        format!(
            "{} {} {} ESCAPE {}",
            self.quote(column),
            Comparison::Like.operator(),
            self.string_literal(&escaped),
            self.string_literal(&LIKE_ESCAPE.to_string())
        )
    }

    /// Returns `true` if pagination is only legal after an `ORDER BY`.
    fn requires_order_for_paging(&self) -> bool {
        false
    }

    /// Renders the pagination clause, or `None` when nothing is skipped or limited.
    fn paginate(&self, skip: usize, take: Option<usize>) -> Option<String>;

    /// Returns the column type used by the audit table.
    fn column_type(&self, column: ColumnType) -> &'static str;

    /// Returns the definition of the auto-increment key column.
    fn sequence_column(&self, name: &str) -> String;
}

fn hex(prefix: &str, bytes: &[u8], suffix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + bytes.len() * 2 + suffix.len());
    out.push_str(prefix);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out.push_str(suffix);
    out
}

fn timestamp(at: DateTime<Utc>, separator: char, digits: usize) -> String {
    let fraction = match digits {
        7 => format!("{:07}", at.timestamp_subsec_nanos() / 100),
        _ => format!("{:06}", at.timestamp_subsec_micros()),
    };
    format!(
        "'{}{separator}{}.{fraction}'",
        at.format("%Y-%m-%d"),
        at.format("%H:%M:%S")
    )
}

/// Bracket-quoted dialect with `OFFSET … FETCH` pagination.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketDialect;

impl SqlDialect for BracketDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Bracket
    }

    fn quote(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn bool_literal(&self, value: bool) -> String {
        String::from(if value { "1" } else { "0" })
    }

    fn timestamp_literal(&self, at: DateTime<Utc>) -> String {
        timestamp(at, 'T', 7)
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        hex("0x", bytes, "")
    }

    fn like_wildcards(&self) -> &'static [char] {
        &['%', '_', '[']
    }

    fn requires_order_for_paging(&self) -> bool {
        true
    }

    fn paginate(&self, skip: usize, take: Option<usize>) -> Option<String> {
        match take {
            Some(take) => Some(format!("OFFSET {skip} ROWS FETCH NEXT {take} ROWS ONLY")),
            None if skip > 0 => Some(format!("OFFSET {skip} ROWS")),
            None => None,
        }
    }

    fn column_type(&self, column: ColumnType) -> &'static str {
        match column {
            ColumnType::Guid => "UNIQUEIDENTIFIER",
            ColumnType::Byte => "TINYINT",
            ColumnType::Int => "INT",
            ColumnType::Name => "NVARCHAR(450)",
            ColumnType::Text => "NVARCHAR(MAX)",
            ColumnType::Binary => "VARBINARY(MAX)",
            ColumnType::Timestamp => "DATETIME2(7)",
        }
    }

    fn sequence_column(&self, name: &str) -> String {
        format!("{} BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY", self.quote(name))
    }
}

/// Backtick-quoted dialect with `LIMIT … OFFSET` pagination.
///
/// Backslashes are escaped in string literals as well as quotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktickDialect;

impl SqlDialect for BacktickDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Backtick
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn bool_literal(&self, value: bool) -> String {
        String::from(if value { "TRUE" } else { "FALSE" })
    }

    fn timestamp_literal(&self, at: DateTime<Utc>) -> String {
        timestamp(at, ' ', 6)
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        hex("X'", bytes, "'")
    }

    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn paginate(&self, skip: usize, take: Option<usize>) -> Option<String> {
        match (skip, take) {
            (0, Some(take)) => Some(format!("LIMIT {take}")),
            (skip, Some(take)) => Some(format!("LIMIT {take} OFFSET {skip}")),
            (0, None) => None,
            (skip, None) => Some(format!("LIMIT 18446744073709551615 OFFSET {skip}")),
        }
    }

    fn column_type(&self, column: ColumnType) -> &'static str {
        match column {
            ColumnType::Guid => "CHAR(36)",
            ColumnType::Byte => "TINYINT",
            ColumnType::Int => "INT",
            ColumnType::Name => "VARCHAR(450)",
            ColumnType::Text => "LONGTEXT",
            ColumnType::Binary => "LONGBLOB",
            ColumnType::Timestamp => "DATETIME(6)",
        }
    }

    fn sequence_column(&self, name: &str) -> String {
        format!("{} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY", self.quote(name))
    }
}

/// Unquoted dialect with `LIMIT … OFFSET` pagination.
///
/// Equality against `NULL` is rendered as `IS NULL` / `IS NOT NULL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDialect;

impl SqlDialect for PlainDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Plain
    }

    fn quote(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    fn bool_literal(&self, value: bool) -> String {
        String::from(if value { "TRUE" } else { "FALSE" })
    }

    fn timestamp_literal(&self, at: DateTime<Utc>) -> String {
        timestamp(at, ' ', 6)
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        hex("X'", bytes, "'")
    }

    fn comparison(&self, column: &str, op: Comparison, value: &SqlValue) -> String {
        match (op, value.is_null()) {
            (Comparison::Eq, true) => format!("{column} IS NULL"),
            (Comparison::Ne, true) => format!("{column} IS NOT NULL"),
            _ => format!("{column} {} {}", op.operator(), self.literal(value)),
        }
    }

    fn paginate(&self, skip: usize, take: Option<usize>) -> Option<String> {
        match (skip, take) {
            (0, Some(take)) => Some(format!("LIMIT {take}")),
            (skip, Some(take)) => Some(format!("LIMIT {take} OFFSET {skip}")),
            (0, None) => None,
            (skip, None) => Some(format!("LIMIT -1 OFFSET {skip}")),
        }
    }

    fn column_type(&self, column: ColumnType) -> &'static str {
        match column {
            ColumnType::Byte | ColumnType::Int => "INTEGER",
            ColumnType::Binary => "BLOB",
            ColumnType::Guid | ColumnType::Name | ColumnType::Text | ColumnType::Timestamp => {
                "TEXT"
            }
        }
    }

    fn sequence_column(&self, name: &str) -> String {
        format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT")
    }
}

/// The available dialects, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// [`BracketDialect`].
    #[default]
    Bracket,
    /// [`BacktickDialect`].
    Backtick,
    /// [`PlainDialect`].
    Plain,
}

impl DialectKind {
    /// Returns the dialect implementation.
    #[must_use]
    pub fn dialect(self) -> Box<dyn SqlDialect> {
        match self {
            Self::Bracket => Box::new(BracketDialect),
            Self::Backtick => Box::new(BacktickDialect),
            Self::Plain => Box::new(PlainDialect),
        }
    }

    /// Returns the configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bracket => "bracket",
            Self::Backtick => "backtick",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
