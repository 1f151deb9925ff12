//! Structured (table) reference resolution
//!
//! Rewrites `Table[Column]`, `[@Column]` and friends into plain A1 references using the
//! table geometry of the source workbook.
//!
//! Supported shapes:
//!
//! | Reference | Resolves to |
//! |-----------|-------------|
//! | `Sales[Amount]` | data rows of one column |
//! | `[@Amount]`, `Sales[@Amount]`, `[@[Unit Price]]` | one cell in the current row |
//! | `Sales[[#This Row],[Amount]]` | same as `[@Amount]` |
//! | `Sales[[Amount]:[Date]]` | data rows of a column span |
//! | `Sales[#Data]`, `Sales[]` | whole data body |
//! | `Sales[#Headers]`, `Sales[[#Headers],[Amount]]` | header row |
//! | `Sales[#All]` | header row plus data body |

use crate::error::ResolveError;
use crate::sheets::SheetRenames;
use crate::token::{Token, TokenKind, TokenStream};
use serde::{Deserialize, Serialize};
use sheetshift_core::{qualify_with_sheet, CellAddress, TableGeometry, TableSet};

/// How resolved references are anchored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// `B5`
    Relative,
    /// `$B5`: stays on the table column when copied, follows the row
    #[default]
    AbsoluteColumn,
    /// `$B$5`
    Absolute,
}

impl AddressMode {
    fn flags(self) -> (bool, bool) {
        // (row_absolute, col_absolute)
        match self {
            AddressMode::Relative => (false, false),
            AddressMode::AbsoluteColumn => (false, true),
            AddressMode::Absolute => (true, true),
        }
    }
}

/// Where the formula being translated lives
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Source name of the current sheet
    pub sheet: &'a str,
    pub cell: CellAddress,
    pub mode: AddressMode,
    /// Sheet names that change in the target workbook
    pub sheet_renames: Option<&'a SheetRenames>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(sheet: &'a str, cell: CellAddress) -> Self {
        Self {
            sheet,
            cell,
            mode: AddressMode::default(),
            sheet_renames: None,
        }
    }

    pub fn with_mode(mut self, mode: AddressMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sheet_renames(mut self, renames: &'a SheetRenames) -> Self {
        self.sheet_renames = Some(renames);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Data,
    Headers,
    All,
    ThisRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Columns {
    All,
    Single(String),
    Span(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StructuredRef {
    table: Option<String>,
    item: Item,
    columns: Columns,
}

/// Whether the formula contains a reference to the current table row
pub fn has_this_row_reference(tokens: &TokenStream) -> bool {
    tokens.iter().any(|t| {
        t.kind() == TokenKind::StructuredReference
            && parse_structured(t.text()).map_or(false, |r| r.item == Item::ThisRow)
    })
}

/// Replace every structured reference with an A1 reference.
///
/// Any reference that cannot be resolved fails the whole formula.
pub fn resolve_structured_refs(
    tokens: &TokenStream,
    tables: &TableSet,
    ctx: &ResolveContext<'_>,
) -> Result<TokenStream, ResolveError> {
    tokens
        .iter()
        .map(|token| {
            if token.kind() != TokenKind::StructuredReference {
                return Ok(token.clone());
            }
            let reference = parse_structured(token.text())?;
            resolve_one(&reference, tables, ctx)
        })
        .collect()
}

fn resolve_one(
    reference: &StructuredRef,
    tables: &TableSet,
    ctx: &ResolveContext<'_>,
) -> Result<Token, ResolveError> {
    let table = match &reference.table {
        Some(name) => tables
            .get(name)
            .ok_or_else(|| ResolveError::UnknownTable(name.clone()))?,
        None => tables
            .enclosing(ctx.sheet, &ctx.cell)
            .ok_or_else(|| no_enclosing(ctx))?,
    };

    let (first_col, last_col) = match &reference.columns {
        Columns::All => (0, table.column_names.len() - 1),
        Columns::Single(name) => {
            let idx = column(table, name)?;
            (idx, idx)
        }
        Columns::Span(a, b) => {
            let (a, b) = (column(table, a)?, column(table, b)?);
            (a.min(b), a.max(b))
        }
    };

    let (first_row, last_row) = match reference.item {
        Item::Data => (table.first_data_row, table.last_data_row),
        Item::Headers => (table.header_row, table.header_row),
        Item::All => (table.header_row, table.last_data_row),
        Item::ThisRow => {
            if !table.data_contains(ctx.sheet, &ctx.cell) {
                return Err(no_enclosing(ctx));
            }
            (ctx.cell.row, ctx.cell.row)
        }
    };

    let (row_abs, col_abs) = ctx.mode.flags();
    let start = CellAddress::with_absolute(
        first_row,
        table.sheet_column(first_col),
        row_abs,
        col_abs,
    );
    let end = CellAddress::with_absolute(last_row, table.sheet_column(last_col), row_abs, col_abs);

    let (kind, mut text) = if start == end {
        (TokenKind::CellReference, start.to_a1_string())
    } else {
        (
            TokenKind::RangeReference,
            format!("{}:{}", start.to_a1_string(), end.to_a1_string()),
        )
    };
    if !table.anchor_sheet.eq_ignore_ascii_case(ctx.sheet) {
        text = qualify_with_sheet(&table.anchor_sheet, &text);
    }
    Ok(Token::new(kind, text))
}

fn column(table: &TableGeometry, name: &str) -> Result<usize, ResolveError> {
    table
        .column_index(name)
        .ok_or_else(|| ResolveError::UnknownColumn {
            table: table.table_name.clone(),
            column: name.to_string(),
        })
}

fn no_enclosing(ctx: &ResolveContext<'_>) -> ResolveError {
    ResolveError::NoEnclosingTable {
        sheet: ctx.sheet.to_string(),
        cell: ctx.cell.relative().to_a1_string(),
    }
}

// === Parsing ===

fn parse_structured(text: &str) -> Result<StructuredRef, ResolveError> {
    let malformed = || ResolveError::Malformed(text.to_string());

    let open = text.find('[').ok_or_else(malformed)?;
    let table = text[..open].trim();
    let body = text[open + 1..].strip_suffix(']').ok_or_else(malformed)?;
    let table = (!table.is_empty()).then(|| table.to_string());

    let (item, columns) = parse_body(body.trim()).ok_or_else(malformed)?;
    Ok(StructuredRef {
        table,
        item,
        columns,
    })
}

fn parse_body(body: &str) -> Option<(Item, Columns)> {
    if body.is_empty() {
        return Some((Item::Data, Columns::All));
    }

    if let Some(rest) = body.strip_prefix('@') {
        let rest = rest.trim();
        if rest.is_empty() {
            return Some((Item::ThisRow, Columns::All));
        }
        if rest.starts_with('[') {
            let (items, columns) = parse_groups(rest)?;
            return items.is_empty().then_some((Item::ThisRow, columns));
        }
        return Some((Item::ThisRow, Columns::Single(unescape(rest))));
    }

    if body.starts_with('[') {
        let (items, columns) = parse_groups(body)?;
        return Some((combine_items(&items)?, columns));
    }

    if body.starts_with('#') {
        return Some((parse_item(body)?, Columns::All));
    }

    Some((Item::Data, Columns::Single(unescape(body))))
}

/// `[a],[b]` or `[a]:[b]` sequences. Returns special items and the column selection.
fn parse_groups(text: &str) -> Option<(Vec<Item>, Columns)> {
    let mut items = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    let mut span = false;

    let mut chars = text.char_indices();
    let mut expect_group = true;
    while let Some((idx, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if expect_group {
            if c != '[' {
                return None;
            }
            let start = idx + 1;
            let mut end = None;
            while let Some((i, c)) = chars.next() {
                match c {
                    '\'' => {
                        chars.next();
                    }
                    ']' => {
                        end = Some(i);
                        break;
                    }
                    _ => {}
                }
            }
            let group = text[start..end?].trim();
            if group.starts_with('#') {
                items.push(parse_item(group)?);
            } else {
                columns.push(unescape(group));
            }
            expect_group = false;
        } else {
            match c {
                ',' => {}
                ':' => span = true,
                _ => return None,
            }
            expect_group = true;
        }
    }
    if expect_group {
        return None;
    }

    let columns = match (columns.len(), span) {
        (0, false) => Columns::All,
        (1, false) => Columns::Single(columns.remove(0)),
        (2, true) => {
            let b = columns.remove(1);
            Columns::Span(columns.remove(0), b)
        }
        _ => return None,
    };
    Some((items, columns))
}

fn parse_item(text: &str) -> Option<Item> {
    let normalized: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    match normalized.as_str() {
        "#DATA" => Some(Item::Data),
        "#HEADERS" => Some(Item::Headers),
        "#ALL" => Some(Item::All),
        "#THIS ROW" => Some(Item::ThisRow),
        // #Totals has no geometry to resolve against
        _ => None,
    }
}

fn combine_items(items: &[Item]) -> Option<Item> {
    match items {
        [] => Some(Item::Data),
        [item] => Some(*item),
        [Item::Headers, Item::Data] | [Item::Data, Item::Headers] => Some(Item::All),
        _ => None,
    }
}

fn unescape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
