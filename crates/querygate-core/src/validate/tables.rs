//! Table-reference extraction.
//!
//! Two independent passes feed the allowlist: a scan of the token stream and
//! the parser's own relation walk. The token scan collects identifiers that
//! directly follow `FROM`, `JOIN`, `TABLE` or a comma inside a `FROM` list,
//! including inside parenthesized joins. Column lists, literals and function
//! arguments (`EXTRACT(YEAR FROM hire_date)`) are never table references.

use sqlparser::ast::{visit_relations, ObjectName, Statement};
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError, Word};
use std::ops::ControlFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Not inside a table list.
    Idle,
    /// Just saw FROM / JOIN / a list comma: next identifier is a table.
    Table,
    /// Saw a table name (or derived table); aliases may follow.
    AfterTable,
    /// Saw `name.`: next identifier continues the qualified name.
    Qualified,
}

#[derive(Debug)]
struct Scope {
    /// True for (sub)queries and parenthesized table groups; false for
    /// function-call argument lists, where FROM and JOIN are not clauses.
    is_query: bool,
    expect: Expect,
}

impl Scope {
    fn new(is_query: bool) -> Self {
        Self {
            is_query,
            expect: Expect::Idle,
        }
    }

    /// `FROM (`: either a derived table or a parenthesized join, whose first
    /// word is a table unless it starts a query.
    fn table_group() -> Self {
        Self {
            is_query: true,
            expect: Expect::Table,
        }
    }
}

/// Returns every table referenced in a FROM/JOIN position, lower-cased,
/// deduplicated in order of appearance. Qualified names keep their full
/// dotted form (`public.employees`).
pub fn referenced_tables(dialect: &dyn Dialect, sql: &str) -> Result<Vec<String>, TokenizerError> {
    let tokens = Tokenizer::new(dialect, sql).tokenize()?;

    let mut scopes = vec![Scope::new(false)];
    let mut tables: Vec<String> = Vec::new();
    // keyword of the previous token when that token was a word
    let mut prev_word: Option<Keyword> = None;

    for token in tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_))) {
        let Some(scope) = scopes.last_mut() else {
            break;
        };

        match token {
            Token::Word(word) => {
                handle_word(scope, word, prev_word, &mut tables);
                prev_word = Some(word.keyword);
                continue;
            }
            Token::LParen => match scope.expect {
                Expect::Table => {
                    scope.expect = Expect::AfterTable;
                    scopes.push(Scope::table_group());
                }
                Expect::Qualified => {
                    scope.expect = Expect::AfterTable;
                    scopes.push(Scope::new(false));
                }
                _ => scopes.push(Scope::new(false)),
            },
            Token::RParen => {
                if scopes.len() > 1 {
                    scopes.pop();
                }
            }
            Token::Period => {
                if scope.expect == Expect::AfterTable && prev_word == Some(Keyword::NoKeyword) {
                    scope.expect = Expect::Qualified;
                }
            }
            Token::Comma => {
                if scope.expect == Expect::AfterTable {
                    scope.expect = Expect::Table;
                }
            }
            Token::SemiColon => {
                scopes.truncate(1);
                scopes[0] = Scope::new(false);
            }
            _ => {
                if matches!(scope.expect, Expect::Table | Expect::Qualified) {
                    scope.expect = Expect::Idle;
                }
            }
        }
        prev_word = None;
    }

    Ok(tables)
}

fn handle_word(scope: &mut Scope, word: &Word, prev_word: Option<Keyword>, tables: &mut Vec<String>) {
    match scope.expect {
        Expect::Table => match word.keyword {
            Keyword::LATERAL | Keyword::ONLY => {}
            Keyword::SELECT | Keyword::WITH | Keyword::VALUES => {
                scope.is_query = true;
                scope.expect = Expect::Idle;
            }
            _ => {
                push_unique(tables, word.value.to_lowercase());
                scope.expect = Expect::AfterTable;
            }
        },
        Expect::Qualified => {
            if let Some(last) = tables.last_mut() {
                last.push('.');
                last.push_str(&word.value.to_lowercase());
            }
            scope.expect = Expect::AfterTable;
        }
        Expect::AfterTable | Expect::Idle => {
            if word.quote_style.is_some() {
                return;
            }
            match word.keyword {
                Keyword::SELECT => {
                    scope.is_query = true;
                    scope.expect = Expect::Idle;
                }
                // `a IS DISTINCT FROM b` is a comparison, not a table list
                Keyword::FROM if scope.is_query && prev_word != Some(Keyword::DISTINCT) => {
                    scope.expect = Expect::Table;
                }
                Keyword::JOIN if scope.is_query => scope.expect = Expect::Table,
                // `... UNION TABLE other` reads a whole table
                Keyword::TABLE => {
                    scope.is_query = true;
                    scope.expect = Expect::Table;
                }
                k if scope.expect == Expect::AfterTable && ends_table_list(k) => {
                    scope.expect = Expect::Idle;
                }
                _ => {}
            }
        }
    }
}

fn ends_table_list(k: Keyword) -> bool {
    matches!(
        k,
        Keyword::WHERE
            | Keyword::GROUP
            | Keyword::ORDER
            | Keyword::HAVING
            | Keyword::LIMIT
            | Keyword::OFFSET
            | Keyword::FETCH
            | Keyword::UNION
            | Keyword::EXCEPT
            | Keyword::INTERSECT
            | Keyword::WINDOW
            | Keyword::QUALIFY
            | Keyword::FOR
            | Keyword::ON
            | Keyword::USING
    )
}

/// Relation names the parser resolved anywhere in `statements`, in the same
/// lower-cased dotted form as [`referenced_tables`].
pub fn relation_names(statements: &[Statement]) -> Vec<String> {
    let mut tables = Vec::new();
    for statement in statements {
        let _ = visit_relations(statement, |name: &ObjectName| {
            push_unique(&mut tables, normalize(name));
            ControlFlow::<()>::Continue(())
        });
    }
    tables
}

fn normalize(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn push_unique(tables: &mut Vec<String>, name: String) {
    if !tables.contains(&name) {
        tables.push(name);
    }
}
