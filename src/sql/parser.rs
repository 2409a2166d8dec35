//! Recursive-descent parser (component J): builds a [`Request`] tree from
//! the grammar of spec.md §4.5, LL(k) with k≤2 via the tokenizer's
//! one-token put-back slot (spec.md §9: "the source uses a one-char
//! lookahead plus a one-token putBack slot; reproduce directly").
//!
//! Design decisions not pinned down by the grammar (spec.md §9 Open
//! Questions leaves some of this to the implementation; recorded in
//! `DESIGN.md`):
//! - `SELECT`/`DELETE` with no `FROM table` defaults to `ARCHIVE`, the
//!   table the grammar's own examples (§8) always query.
//! - `INSERT` with no explicit column list defaults to
//!   `(POINT_NAME, STAMP, STATE, VALUE)` against `ARCHIVE`, matching the
//!   four-value form of §8 scenario 5.
//! - The writable column list accepted in an `INSERT`/`UPDATE` column
//!   list is `{POINT, POINT_NAME, POINT_UUID, STAMP, STATE, VALUE}` —
//!   the columns that address or carry a point value — distinct from the
//!   narrower `Column::meta().writable` flag, which instead governs the
//!   positioned-update path of component M.

use crate::sql::column::{Column, Table};
use crate::sql::error::{Result, SqlError};
use crate::sql::lexer::{Lexer, Token};
use crate::sql::request::{
    Command, PointOp, PointSelector, QueryExtra, Request, SyncDescriptor, TimeBound, TimeOp,
    UpdateExtra, ValueToken,
};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

const INSERT_UPDATE_COLUMNS: &[Column] = &[
    Column::Point,
    Column::PointName,
    Column::PointUuid,
    Column::Stamp,
    Column::State,
    Column::Value,
];

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    pub fn param_count(&self) -> usize {
        self.lexer.param_count()
    }

    pub fn parse(&mut self) -> Result<Request> {
        let tok = self.lexer.next_token()?;
        let request = match &tok {
            Token::Word(w, true) if eqi(w, "SELECT") => self.parse_select(),
            Token::Word(w, true) if eqi(w, "INSERT") => self.parse_insert(),
            Token::Word(w, true) if eqi(w, "UPDATE") => self.parse_update(),
            Token::Word(w, true) if eqi(w, "DELETE") => self.parse_delete(),
            Token::Eof => Err(SqlError::UnexpectedEnd),
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }?;
        let trailing = self.lexer.next_token()?;
        if trailing != Token::Eof {
            return Err(SqlError::UnexpectedToken(format!("{trailing:?}")));
        }
        Ok(request)
    }

    // ---- shared helpers ------------------------------------------------

    fn peek(&mut self) -> Result<Token> {
        let tok = self.lexer.next_token()?;
        self.lexer.put_back(tok.clone());
        Ok(tok)
    }

    fn eat_word(&mut self, word: &str) -> Result<bool> {
        let tok = self.lexer.next_token()?;
        match &tok {
            Token::Word(w, true) if eqi(w, word) => Ok(true),
            _ => {
                self.lexer.put_back(tok);
                Ok(false)
            }
        }
    }

    fn eat_punct(&mut self, c: char) -> Result<bool> {
        let tok = self.lexer.next_token()?;
        if tok == Token::Punct(c) {
            Ok(true)
        } else {
            self.lexer.put_back(tok);
            Ok(false)
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        let tok = self.lexer.next_token()?;
        if tok == Token::Punct(c) {
            Ok(())
        } else {
            Err(SqlError::UnexpectedToken(format!("{tok:?}")))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.lexer.next_token()? {
            Token::Word(w, _) => Ok(w),
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn expect_table(&mut self) -> Result<Table> {
        let name = self.expect_identifier()?;
        Table::parse(&name)
    }

    /// Reads `=`, `<`, `<=`, `>`, or `>=` by combining up to two punctuation
    /// tokens (the grammar's only comparison operators, §4.5).
    fn read_comparison(&mut self) -> Result<String> {
        match self.lexer.next_token()? {
            Token::Punct('=') => Ok("=".to_string()),
            Token::Punct('<') => {
                if self.eat_punct('=')? {
                    Ok("<=".to_string())
                } else {
                    Ok("<".to_string())
                }
            }
            Token::Punct('>') => {
                if self.eat_punct('=')? {
                    Ok(">=".to_string())
                } else {
                    Ok(">".to_string())
                }
            }
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn read_point_op(&mut self) -> Result<PointOp> {
        if self.eat_word("LIKE")? {
            return Ok(PointOp::Like);
        }
        if self.eat_word("REGEXP")? {
            return Ok(PointOp::Regexp);
        }
        self.expect_punct('=')?;
        Ok(PointOp::Eq)
    }

    /// `value ::= quoted | numeric | ? | NULL | NOW | TODAY | YESTERDAY |
    /// BOT | EOT` (the keyword forms accept an optional `()`). Also used
    /// for `timeValue`, which the grammar leaves undefined beyond reuse of
    /// `value`.
    fn parse_value(&mut self) -> Result<ValueToken> {
        match self.lexer.next_token()? {
            Token::Quoted(s) => Ok(ValueToken::Quoted(s)),
            Token::Integer(n) => Ok(ValueToken::Integer(n)),
            Token::Float(f) => Ok(ValueToken::Float(f)),
            Token::Parameter(idx) => Ok(ValueToken::Parameter(idx)),
            Token::Word(w, _) => {
                let upper = w.to_ascii_uppercase();
                let token = match upper.as_str() {
                    "NULL" => ValueToken::Null,
                    "NOW" => ValueToken::Now,
                    "TODAY" => ValueToken::Today,
                    "YESTERDAY" => ValueToken::Yesterday,
                    "BOT" => ValueToken::Bot,
                    "EOT" => ValueToken::Eot,
                    _ => return Err(SqlError::UnexpectedToken(w)),
                };
                if self.eat_punct('(')? {
                    self.expect_punct(')')?;
                }
                Ok(token)
            }
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    // ---- SELECT ----------------------------------------------------------

    fn parse_select(&mut self) -> Result<Request> {
        let all = self.eat_word("ALL")?;

        let mut columns = Vec::new();
        let mut titles = Vec::new();
        let next = self.peek()?;
        let has_columns = !matches!(&next, Token::Word(w, true) if eqi(w, "FROM"))
            && !matches!(next, Token::Eof);
        if has_columns {
            loop {
                if !columns.is_empty() && columns.contains(&Column::Count) {
                    return Err(SqlError::UnexpectedColumn(
                        "COUNT(*) is only permitted alone in the projection".to_string(),
                    ));
                }
                let col = self.parse_select_column()?;
                if col == Column::Count && !columns.is_empty() {
                    return Err(SqlError::UnexpectedColumn(
                        "COUNT(*) is only permitted alone in the projection".to_string(),
                    ));
                }
                titles.push(col.meta().label.to_string());
                columns.push(col);
                if !self.eat_punct(',')? {
                    break;
                }
            }
        }

        let table = if self.eat_word("FROM")? {
            self.expect_table()?
        } else {
            Table::Archive
        };

        if columns.iter().any(|c| *c == Column::All) {
            columns = table.all_columns();
            titles = columns.iter().map(|c| c.meta().label.to_string()).collect();
        }

        let mut request = Request::new(Command::Select, table);
        request.all = all;
        request.interpolated = columns.contains(&Column::Interpolated);
        request.extrapolated = columns.contains(&Column::Extrapolated);

        if self.eat_word("WHERE")? {
            loop {
                self.parse_where_pred(&mut request, true)?;
                if !self.eat_word("AND")? {
                    break;
                }
            }
        }

        if table == Table::Archive && !all && request.point_selector.is_none() {
            return Err(SqlError::PointNotSpecified);
        }
        if request.stamp_bound.is_some() && request.version_bound.is_some() {
            return Err(SqlError::UnexpectedToken(
                "STAMP and VERSION are mutually exclusive in one query".to_string(),
            ));
        }

        if self.eat_word("LIMIT")? {
            request.limit = Some(self.expect_unsigned()?);
        }

        request.query = Some(QueryExtra {
            columns,
            titles,
            alias_map: Default::default(),
        });
        Ok(request)
    }

    fn parse_select_column(&mut self) -> Result<Column> {
        if self.eat_punct('*')? {
            return Ok(Column::All);
        }
        let name = self.expect_identifier()?;
        let col = Column::from_word(&name).ok_or_else(|| SqlError::UnknownColumn(name.clone()))?;
        if col == Column::Count && self.eat_punct('(')? {
            self.expect_punct('*')?;
            self.expect_punct(')')?;
        }
        Ok(col)
    }

    fn expect_unsigned(&mut self) -> Result<u64> {
        match self.lexer.next_token()? {
            Token::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    /// `wherePred ::= pointPred | stampPred | versionPred | syncPred |
    /// isNotNull` — the full `SELECT` where-clause vocabulary.
    /// `update`/`delete` call this with `select_clause = false` and accept
    /// only a single `pointPred` (the grammar's narrower `[WHERE
    /// pointPred]`).
    fn parse_where_pred(&mut self, request: &mut Request, select_clause: bool) -> Result<()> {
        let word = self.expect_identifier()?;
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "POINT" | "POINT_NAME" | "POINT_UUID" => {
                if request.point_selector.is_some() {
                    return Err(SqlError::UnexpectedToken(
                        "a point predicate was already given".to_string(),
                    ));
                }
                let column = match upper.as_str() {
                    "POINT" => Column::Point,
                    "POINT_NAME" => Column::PointName,
                    _ => Column::PointUuid,
                };
                if !request.table.point_predicate_columns().contains(&column) {
                    return Err(SqlError::UnknownColumn(upper.clone()));
                }
                if upper == "POINT_UUID" {
                    self.expect_punct('=')?;
                    let value = self.parse_value()?;
                    request.point_selector = Some(PointSelector::Uuid(value));
                } else {
                    let op = self.read_point_op()?;
                    let value = self.parse_value()?;
                    request.point_selector = Some(if upper == "POINT" {
                        PointSelector::Point(op, value)
                    } else {
                        PointSelector::Name(op, value)
                    });
                }
            }
            "STAMP" if select_clause => {
                let op = self.read_comparison()?;
                let time_op = TimeOp::from_operator(&op)
                    .ok_or_else(|| SqlError::UnexpectedToken(op.clone()))?;
                let value = self.parse_value()?;
                request.stamp_bound = Some(TimeBound { op: time_op, value });
            }
            "VERSION" if select_clause => {
                let op = self.read_comparison()?;
                let time_op = TimeOp::from_operator(&op)
                    .ok_or_else(|| SqlError::UnexpectedToken(op.clone()))?;
                let value = self.parse_value()?;
                request.version_bound = Some(TimeBound { op: time_op, value });
                request.pull = true;
            }
            "CRONTAB" | "ELAPSED" | "STAMPS" if select_clause => {
                self.expect_punct('=')?;
                let quoted = self.expect_quoted()?;
                match upper.as_str() {
                    "CRONTAB" => request.sync.crontab = Some(quoted),
                    "ELAPSED" => request.sync.elapsed = Some(quoted),
                    _ => request.sync.stamps = Some(quoted),
                }
                request.synced = true;
            }
            "TIME_LIMIT" if select_clause => {
                self.expect_punct('=')?;
                request.time_limit = Some(self.expect_quoted()?);
            }
            "VALUE" if select_clause => {
                if !self.eat_word("IS")? {
                    return Err(SqlError::UnexpectedToken("expected IS NOT NULL".to_string()));
                }
                if !self.eat_word("NOT")? {
                    return Err(SqlError::UnexpectedToken("expected NOT NULL".to_string()));
                }
                if !self.eat_word("NULL")? {
                    return Err(SqlError::UnexpectedToken("expected NULL".to_string()));
                }
                request.null_ignored = true;
            }
            other => return Err(SqlError::UnexpectedToken(other.to_string())),
        }
        Ok(())
    }

    fn expect_quoted(&mut self) -> Result<String> {
        match self.lexer.next_token()? {
            Token::Quoted(s) => Ok(s),
            other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    // ---- INSERT ------------------------------------------------------

    fn parse_insert(&mut self) -> Result<Request> {
        let _ = self.eat_word("INTO")?;
        let table = self.expect_table()?;
        if !table.is_writable() {
            return Err(SqlError::TableReadOnly(table.name().to_string()));
        }

        let mut columns = Vec::new();
        if self.eat_punct('(')? {
            loop {
                let col = self.expect_insert_update_column()?;
                columns.push(col);
                if !self.eat_punct(',')? {
                    break;
                }
            }
            self.expect_punct(')')?;
        }

        let mut request = Request::new(Command::Insert, table);
        let mut value_rows = Vec::new();

        if self.eat_word("VALUES")? {
            loop {
                self.expect_punct('(')?;
                let mut row = Vec::new();
                loop {
                    row.push(self.parse_value()?);
                    if !self.eat_punct(',')? {
                        break;
                    }
                }
                self.expect_punct(')')?;
                value_rows.push(row);
                if !self.eat_word("VALUES")? {
                    break;
                }
            }
        } else if self.eat_word("SET")? {
            if !columns.is_empty() {
                return Err(SqlError::UnexpectedToken(
                    "INSERT ... SET does not take an explicit column list".to_string(),
                ));
            }
            let mut row = Vec::new();
            loop {
                columns.push(self.expect_insert_update_column()?);
                self.expect_punct('=')?;
                row.push(self.parse_value()?);
                if !self.eat_punct(',')? {
                    break;
                }
            }
            value_rows.push(row);
        } else {
            return Err(SqlError::UnexpectedEnd);
        }

        if columns.is_empty() {
            columns = vec![
                Column::PointName,
                Column::Stamp,
                Column::State,
                Column::Value,
            ];
        }
        for row in &value_rows {
            if row.len() != columns.len() {
                return Err(SqlError::UnexpectedToken(
                    "value count does not match column count".to_string(),
                ));
            }
        }

        request.update = Some(UpdateExtra {
            columns,
            value_rows,
        });
        Ok(request)
    }

    fn expect_insert_update_column(&mut self) -> Result<Column> {
        let name = self.expect_identifier()?;
        let col = Column::from_word(&name).ok_or_else(|| SqlError::UnknownColumn(name.clone()))?;
        if !INSERT_UPDATE_COLUMNS.contains(&col) {
            return Err(SqlError::ColumnReadOnly(name));
        }
        Ok(col)
    }

    // ---- UPDATE ------------------------------------------------------

    fn parse_update(&mut self) -> Result<Request> {
        let all = self.eat_word("ALL")?;
        let table = self.expect_table()?;
        if !table.is_writable() {
            return Err(SqlError::TableReadOnly(table.name().to_string()));
        }
        if !self.eat_word("SET")? {
            return Err(SqlError::UnexpectedToken("expected SET".to_string()));
        }

        let mut columns = Vec::new();
        let mut row = Vec::new();
        loop {
            columns.push(self.expect_insert_update_column()?);
            self.expect_punct('=')?;
            row.push(self.parse_value()?);
            if !self.eat_punct(',')? {
                break;
            }
        }

        let mut request = Request::new(Command::Update, table);
        request.all = all;

        if self.eat_word("WHERE")? {
            self.parse_where_pred(&mut request, false)?;
        }
        if !all && request.point_selector.is_none() {
            return Err(SqlError::PointNotSpecified);
        }

        request.update = Some(UpdateExtra {
            columns,
            value_rows: vec![row],
        });
        Ok(request)
    }

    // ---- DELETE ------------------------------------------------------

    fn parse_delete(&mut self) -> Result<Request> {
        let all = self.eat_word("ALL")?;
        let _ = self.eat_word("FROM")?;
        let table = self.expect_table()?;
        if !table.is_writable() {
            return Err(SqlError::TableReadOnly(table.name().to_string()));
        }

        let mut request = Request::new(Command::Delete, table);
        request.all = all;

        if self.eat_word("WHERE")? {
            self.parse_where_pred(&mut request, false)?;
        }
        if !all && request.point_selector.is_none() {
            return Err(SqlError::PointNotSpecified);
        }
        Ok(request)
    }
}

fn eqi(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_by_point_name_with_stamp_bound() {
        let mut p = Parser::new(
            "SELECT stamp, value FROM ARCHIVE WHERE point_name = 'T.outdoor' AND stamp > '2024-01-01'",
        );
        let req = p.parse().unwrap();
        assert_eq!(req.command, Command::Select);
        assert_eq!(req.table, Table::Archive);
        assert!(matches!(
            req.point_selector,
            Some(PointSelector::Name(PointOp::Eq, ValueToken::Quoted(ref s))) if s == "T.outdoor"
        ));
        assert_eq!(
            req.stamp_bound,
            Some(TimeBound {
                op: TimeOp::After,
                value: ValueToken::Quoted("2024-01-01".to_string())
            })
        );
    }

    #[test]
    fn parses_select_count_star() {
        let mut p = Parser::new("SELECT COUNT(*) FROM ARCHIVE WHERE point = 'T.outdoor'");
        let req = p.parse().unwrap();
        let query = req.query.unwrap();
        assert_eq!(query.columns, vec![Column::Count]);
    }

    #[test]
    fn rejects_count_star_combined_with_other_columns() {
        let mut p = Parser::new("SELECT COUNT(*), value FROM ARCHIVE WHERE point = 'x'");
        assert!(p.parse().is_err());
    }

    #[test]
    fn parses_insert_values_with_default_columns() {
        let mut p = Parser::new("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 21.5)");
        let req = p.parse().unwrap();
        assert_eq!(req.command, Command::Insert);
        let update = req.update.unwrap();
        assert_eq!(
            update.columns,
            vec![
                Column::PointName,
                Column::Stamp,
                Column::State,
                Column::Value
            ]
        );
        assert_eq!(update.value_rows.len(), 1);
        assert_eq!(update.value_rows[0][1], ValueToken::Now);
    }

    #[test]
    fn parses_insert_into_explicit_columns() {
        let mut p = Parser::new(
            "INSERT INTO ARCHIVE (POINT_NAME, STAMP, VALUE) VALUES ('T.x', NOW(), ?)",
        );
        let req = p.parse().unwrap();
        let update = req.update.unwrap();
        assert_eq!(
            update.columns,
            vec![Column::PointName, Column::Stamp, Column::Value]
        );
        assert_eq!(update.value_rows[0][2], ValueToken::Parameter(0));
    }

    #[test]
    fn rejects_insert_into_read_only_table() {
        let mut p = Parser::new("INSERT INTO POINTS VALUES ('T.x', NOW())");
        let err = p.parse().unwrap_err();
        assert!(matches!(err, SqlError::TableReadOnly(_)));
    }

    #[test]
    fn parses_update_positioned_by_point_name() {
        let mut p = Parser::new(
            "UPDATE ARCHIVE SET value = 22.0 WHERE point_name = 'T.x'",
        );
        let req = p.parse().unwrap();
        assert_eq!(req.command, Command::Update);
        let update = req.update.unwrap();
        assert_eq!(update.columns, vec![Column::Value]);
        assert_eq!(update.value_rows[0], vec![ValueToken::Float(22.0)]);
    }

    #[test]
    fn update_requires_point_predicate_unless_all() {
        let mut p = Parser::new("UPDATE ARCHIVE SET value = 1.0");
        assert!(matches!(
            p.parse().unwrap_err(),
            SqlError::PointNotSpecified
        ));

        let mut p_all = Parser::new("UPDATE ALL ARCHIVE SET value = 1.0");
        assert!(p_all.parse().is_ok());
    }

    #[test]
    fn parses_delete_with_point_uuid() {
        let uuid = uuid::Uuid::new_v4().to_string();
        let sql = format!("DELETE FROM ARCHIVE WHERE point_uuid = '{uuid}'");
        let mut p = Parser::new(&sql);
        let req = p.parse().unwrap();
        assert_eq!(req.command, Command::Delete);
        assert!(matches!(req.point_selector, Some(PointSelector::Uuid(_))));
    }

    #[test]
    fn rejects_point_uuid_with_like() {
        let mut p = Parser::new("DELETE FROM ARCHIVE WHERE point_uuid LIKE 'x'");
        assert!(p.parse().is_err());
    }

    #[test]
    fn version_predicate_selects_pull_mode() {
        let mut p = Parser::new(
            "SELECT value FROM ARCHIVE WHERE point = 'x' AND version > '2024-01-01'",
        );
        let req = p.parse().unwrap();
        assert!(req.pull);
        assert!(req.version_bound.is_some());
    }

    #[test]
    fn rejects_stamp_and_version_together() {
        let mut p = Parser::new(
            "SELECT value FROM ARCHIVE WHERE point = 'x' AND stamp > '2024-01-01' AND version > '2024-01-01'",
        );
        assert!(p.parse().is_err());
    }

    #[test]
    fn value_is_not_null_sets_null_ignored() {
        let mut p = Parser::new(
            "SELECT value FROM ARCHIVE WHERE point = 'x' AND value IS NOT NULL",
        );
        let req = p.parse().unwrap();
        assert!(req.null_ignored);
    }

    #[test]
    fn select_all_does_not_require_point_predicate() {
        let mut p = Parser::new("SELECT ALL point_name FROM POINTS");
        assert!(p.parse().is_ok());
    }

    #[test]
    fn select_star_expands_to_schema_columns() {
        let mut p = Parser::new("SELECT * FROM POINTS");
        let req = p.parse().unwrap();
        assert_eq!(req.query.unwrap().columns, Table::Points.all_columns());
    }

    #[test]
    fn tracks_parameter_count_across_the_statement() {
        let mut p = Parser::new("SELECT value FROM ARCHIVE WHERE point = ? AND stamp > ?");
        p.parse().unwrap();
        assert_eq!(p.param_count(), 2);
    }

    #[test]
    fn rejects_bare_point_predicate_against_the_points_table() {
        let mut p = Parser::new("SELECT * FROM POINTS WHERE point = 'T.x'");
        assert!(matches!(
            p.parse().unwrap_err(),
            SqlError::UnknownColumn(_)
        ));
    }

    #[test]
    fn point_name_and_point_uuid_predicates_are_allowed_against_points() {
        let mut p = Parser::new("SELECT * FROM POINTS WHERE point_name = 'T.x'");
        assert!(p.parse().is_ok());

        let uuid = uuid::Uuid::new_v4().to_string();
        let sql = format!("SELECT * FROM POINTS WHERE point_uuid = '{uuid}'");
        let mut p = Parser::new(&sql);
        assert!(p.parse().is_ok());
    }

    #[test]
    fn selecting_interpolated_or_extrapolated_sets_the_request_flags() {
        let mut p = Parser::new("SELECT interpolated FROM ARCHIVE WHERE point = 'x'");
        let req = p.parse().unwrap();
        assert!(req.interpolated);
        assert!(!req.extrapolated);

        let mut p = Parser::new("SELECT extrapolated FROM ARCHIVE WHERE point = 'x'");
        let req = p.parse().unwrap();
        assert!(!req.interpolated);
        assert!(req.extrapolated);

        let mut p = Parser::new("SELECT value FROM ARCHIVE WHERE point = 'x'");
        let req = p.parse().unwrap();
        assert!(!req.interpolated);
        assert!(!req.extrapolated);
    }
}
