//! SQL text dumps.

use std::io::BufRead;

use rusqlite::Connection;

use super::progress::{CancelToken, Tracker};
use crate::error::{EngineError, Result};

/// Dump statements that would fight the importer's own transaction.
const TRANSACTION_CONTROL: &[&str] = &["BEGIN", "COMMIT", "END", "ROLLBACK"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lexer {
    #[default]
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    Bracket,
    LineComment,
    BlockComment,
}

/// A complete statement and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub line: usize,
}

/// Where the splitter is within a `CREATE [TEMP] TRIGGER` statement.
///
/// Inside a trigger body a `;` only ends the statement when it follows an
/// `END` token that itself came straight after a top-level `;`. Any other
/// `END` (a `CASE ... END`, for one) keeps the body open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Trigger {
    /// No token seen yet.
    #[default]
    Start,
    Create,
    CreateTemp,
    /// Not a trigger; the next `;` ends it.
    Plain,
    Body,
    /// Right after a `;` inside the body.
    Semi,
    /// `; END` seen; a `;` now closes the trigger.
    End,
}

impl Trigger {
    fn on_token(self, word: Option<&str>) -> Self {
        match (self, word) {
            (Self::Start, Some("CREATE")) => Self::Create,
            (Self::Create, Some("TEMP" | "TEMPORARY")) => Self::CreateTemp,
            (Self::Create | Self::CreateTemp, Some("TRIGGER")) => Self::Body,
            (Self::Start | Self::Create | Self::CreateTemp | Self::Plain, _) => Self::Plain,
            (Self::Semi, Some("END")) => Self::End,
            (Self::Body | Self::Semi | Self::End, _) => Self::Body,
        }
    }

    /// Next state after a top-level `;`, or `None` when it ends the statement.
    fn on_semicolon(self) -> Option<Self> {
        match self {
            Self::Body | Self::Semi => Some(Self::Semi),
            _ => None,
        }
    }
}

/// Splits SQL text on `;` outside quotes and comments. Trigger bodies stay
/// whole until their closing `END;`.
#[derive(Debug, Default)]
pub(crate) struct Splitter {
    buf: String,
    lexer: Lexer,
    trigger: Trigger,
    word: String,
    has_code: bool,
    start_line: usize,
}

impl Splitter {
    pub(crate) fn push_line(&mut self, line: &str, line_no: usize) -> Vec<Statement> {
        let mut done = Vec::new();
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match self.lexer {
                Lexer::Code if is_word_char(c) => {
                    self.mark_code(line_no);
                    self.word.push(c);
                }
                Lexer::Code => {
                    self.end_word();
                    match c {
                        '-' if chars.peek() == Some(&'-') => self.lexer = Lexer::LineComment,
                        '/' if chars.peek() == Some(&'*') => {
                            self.buf.push(c);
                            if let Some(star) = chars.next() {
                                self.buf.push(star);
                            }
                            self.lexer = Lexer::BlockComment;
                            continue;
                        }
                        ';' => {
                            self.buf.push(c);
                            if !self.has_code {
                                self.buf.clear();
                            } else {
                                match self.trigger.on_semicolon() {
                                    Some(next) => self.trigger = next,
                                    None => done.push(self.take()),
                                }
                            }
                            continue;
                        }
                        c if c.is_whitespace() => {}
                        _ => {
                            self.mark_code(line_no);
                            self.trigger = self.trigger.on_token(None);
                            self.lexer = match c {
                                '\'' => Lexer::SingleQuote,
                                '"' => Lexer::DoubleQuote,
                                '`' => Lexer::Backtick,
                                '[' => Lexer::Bracket,
                                _ => Lexer::Code,
                            };
                        }
                    }
                }
                Lexer::SingleQuote if c == '\'' => self.lexer = Lexer::Code,
                Lexer::DoubleQuote if c == '"' => self.lexer = Lexer::Code,
                Lexer::Backtick if c == '`' => self.lexer = Lexer::Code,
                Lexer::Bracket if c == ']' => self.lexer = Lexer::Code,
                Lexer::LineComment if c == '\n' => self.lexer = Lexer::Code,
                Lexer::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                    self.buf.push(c);
                    if let Some(slash) = chars.next() {
                        self.buf.push(slash);
                    }
                    self.lexer = Lexer::Code;
                    continue;
                }
                _ => {}
            }
            self.buf.push(c);
        }

        // A line comment without a trailing newline still ends with the line.
        if self.lexer == Lexer::LineComment {
            self.lexer = Lexer::Code;
        }
        done
    }

    /// The trailing statement at end of input, if it lacks its `;`.
    pub(crate) fn finish(mut self) -> Result<Option<Statement>> {
        let open = match self.lexer {
            Lexer::SingleQuote | Lexer::DoubleQuote | Lexer::Backtick | Lexer::Bracket => {
                Some("unterminated quoted text")
            }
            Lexer::BlockComment => Some("unterminated block comment"),
            Lexer::Code | Lexer::LineComment => None,
        };
        if let Some(reason) = open {
            return Err(EngineError::MalformedDump {
                line: self.start_line,
                reason: reason.to_string(),
            });
        }
        self.end_word();
        if !self.has_code {
            return Ok(None);
        }
        if matches!(self.trigger, Trigger::Body | Trigger::Semi) {
            return Err(EngineError::MalformedDump {
                line: self.start_line,
                reason: "trigger body is missing END".to_string(),
            });
        }
        Ok(Some(Statement {
            sql: self.buf.trim().to_string(),
            line: self.start_line,
        }))
    }

    fn mark_code(&mut self, line_no: usize) {
        if !self.has_code {
            self.has_code = true;
            self.start_line = line_no;
        }
    }

    /// Feed the pending identifier, if any, to the trigger state.
    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.word).to_ascii_uppercase();
        self.trigger = self.trigger.on_token(Some(&word));
    }

    fn take(&mut self) -> Statement {
        let sql = std::mem::take(&mut self.buf).trim().to_string();
        self.has_code = false;
        self.trigger = Trigger::Start;
        Statement {
            sql,
            line: self.start_line,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// First `n` words of `sql`, uppercased, skipping comments.
fn leading_keywords(sql: &str, n: usize) -> Vec<String> {
    let mut rest = sql;
    let mut words = Vec::with_capacity(n);
    while words.len() < n {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
            continue;
        }
        if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
            continue;
        }
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        words.push(rest[..end].to_ascii_uppercase());
        rest = &rest[end..];
    }
    words
}

fn is_transaction_control(sql: &str) -> bool {
    leading_keywords(sql, 1)
        .first()
        .is_some_and(|word| TRANSACTION_CONTROL.contains(&word.as_str()))
}

fn execute(conn: &Connection, statement: &Statement) -> Result<()> {
    let malformed = |e: rusqlite::Error| EngineError::MalformedDump {
        line: statement.line,
        reason: e.to_string(),
    };
    let mut stmt = conn.prepare(&statement.sql).map_err(malformed)?;
    if stmt.column_count() > 0 {
        // Row-returning statements (some PRAGMAs, stray SELECTs) are drained.
        let mut rows = stmt.query([]).map_err(malformed)?;
        while rows.next().map_err(malformed)?.is_some() {}
    } else {
        stmt.execute([]).map_err(malformed)?;
    }
    Ok(())
}

/// Execute every statement in `reader`. Returns the number executed.
pub(crate) fn load(
    conn: &Connection,
    mut reader: impl BufRead,
    tracker: &mut Tracker<'_>,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut splitter = Splitter::default();
    let mut line = String::new();
    let mut line_no = 0;
    let mut consumed = 0u64;
    let mut executed = 0u64;

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        line_no += 1;

        for statement in splitter.push_line(&line, line_no) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if is_transaction_control(&statement.sql) {
                continue;
            }
            execute(conn, &statement)?;
            executed += 1;
        }
        tracker.advance(consumed, executed);
    }

    if let Some(statement) = splitter.finish()?
        && !is_transaction_control(&statement.sql)
    {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        execute(conn, &statement)?;
        executed += 1;
    }
    Ok(executed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        let mut splitter = Splitter::default();
        let mut out = Vec::new();
        for (i, line) in text.split_inclusive('\n').enumerate() {
            out.extend(splitter.push_line(line, i + 1).into_iter().map(|s| s.sql));
        }
        if let Some(last) = splitter.finish().unwrap() {
            out.push(last.sql);
        }
        out
    }

    #[test]
    fn splits_simple_statements() {
        assert_eq!(
            split("CREATE TABLE a (x);\nINSERT INTO a VALUES (1);\n"),
            vec!["CREATE TABLE a (x);", "INSERT INTO a VALUES (1);"]
        );
    }

    #[test]
    fn semicolons_in_strings_and_comments_do_not_split() {
        let text = "INSERT INTO a VALUES ('x;y'); -- trailing; comment\n\
                    /* block; comment */ INSERT INTO a VALUES (\"q;\");\n";
        let stmts = split(text);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO a VALUES ('x;y');");
        assert!(stmts[1].ends_with("VALUES (\"q;\");"));
    }

    #[test]
    fn doubled_quotes_stay_inside_string() {
        assert_eq!(
            split("INSERT INTO a VALUES ('it''s; fine');"),
            vec!["INSERT INTO a VALUES ('it''s; fine');"]
        );
    }

    #[test]
    fn multi_line_string_is_one_statement() {
        let stmts = split("INSERT INTO a VALUES ('line one;\nline two');\nSELECT 1;\n");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("line one;\nline two"));
    }

    #[test]
    fn trigger_body_is_kept_whole() {
        let text = "CREATE TRIGGER t AFTER INSERT ON a BEGIN\n\
                    UPDATE a SET x = 1;\n\
                    DELETE FROM b;\n\
                    END;\nSELECT 2;\n";
        let stmts = split(text);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TRIGGER"));
        assert!(stmts[0].ends_with("END;"));
        assert_eq!(stmts[1], "SELECT 2;");
    }

    #[test]
    fn case_end_inside_trigger_does_not_close_it() {
        let text = "CREATE TABLE a(x,y); CREATE TRIGGER trg AFTER INSERT ON a BEGIN \
                    UPDATE a SET y = CASE WHEN new.x > 0 THEN 'pos' ELSE 'neg' END; END; \
                    INSERT INTO a (x) VALUES (1);\n";
        let stmts = split(text);
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].starts_with("CREATE TRIGGER trg"));
        assert!(stmts[1].ends_with("'neg' END; END;"));
        assert_eq!(stmts[2], "INSERT INTO a (x) VALUES (1);");
    }

    #[test]
    fn end_named_column_in_body_is_not_a_terminator() {
        let text = "create trigger t after insert on a begin\n\
                    update a set y = x where \"end\" = 1;\n\
                    update a set y = [end];\n\
                    end;\n";
        assert_eq!(split(text).len(), 1);
    }

    #[test]
    fn trigger_without_end_is_malformed() {
        let mut splitter = Splitter::default();
        splitter.push_line("CREATE TRIGGER t AFTER INSERT ON a BEGIN\n", 4);
        splitter.push_line("SELECT CASE WHEN 1 THEN 2 END;\n", 5);
        let err = splitter.finish().unwrap_err();
        assert!(matches!(err, EngineError::MalformedDump { line: 4, .. }));
    }

    #[test]
    fn create_table_named_trigger_log_is_plain() {
        assert_eq!(
            split("CREATE TABLE trigger_log (x);\nSELECT 1;\n"),
            vec!["CREATE TABLE trigger_log (x);", "SELECT 1;"]
        );
    }

    #[test]
    fn temp_trigger_after_comment_is_detected() {
        let stmts = split("-- audit\nCREATE TEMP TRIGGER t AFTER DELETE ON a BEGIN SELECT 1; END;\n");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn missing_final_semicolon_is_tolerated() {
        assert_eq!(split("SELECT 1;\nSELECT 2"), vec!["SELECT 1;", "SELECT 2"]);
    }

    #[test]
    fn stray_semicolons_and_comment_only_input_yield_nothing() {
        assert!(split(";;\n-- nothing here\n/* or here */\n").is_empty());
    }

    #[test]
    fn unterminated_string_is_malformed() {
        let mut splitter = Splitter::default();
        splitter.push_line("SELECT 1;\n", 1);
        splitter.push_line("INSERT INTO a VALUES ('open\n", 2);
        let err = splitter.finish().unwrap_err();
        assert!(matches!(err, EngineError::MalformedDump { line: 2, .. }));
    }

    #[test]
    fn statement_lines_are_tracked() {
        let mut splitter = Splitter::default();
        assert!(splitter.push_line("\n", 1).is_empty());
        assert!(splitter.push_line("SELECT\n", 2).is_empty());
        let stmts = splitter.push_line("1;\n", 3);
        assert_eq!(stmts[0].line, 2);
    }

    #[test]
    fn transaction_control_is_recognised() {
        assert!(is_transaction_control("BEGIN TRANSACTION;"));
        assert!(is_transaction_control("commit;"));
        assert!(is_transaction_control("/* x */ END;"));
        assert!(!is_transaction_control("CREATE TABLE begin_log (x);"));
    }

    #[test]
    fn leading_keywords_skip_comments() {
        assert_eq!(
            leading_keywords("-- c\n/* d */ create temp trigger x", 3),
            vec!["CREATE", "TEMP", "TRIGGER"]
        );
    }
}
