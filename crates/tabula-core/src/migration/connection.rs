//! Schema connections: where DDL statements are executed.

use super::ddl::{Statement, TriggerEvent};
use super::error::SqlError;
use std::collections::BTreeMap;

/// A connection able to execute DDL inside a schema transaction.
///
/// One handler owns one connection; connections are never shared between
/// concurrent writers.
pub trait SchemaConnection {
    /// Execute one statement.
    fn execute(&mut self, statement: &Statement) -> Result<(), SqlError>;

    /// Open a schema transaction.
    fn begin(&mut self) -> Result<(), SqlError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), SqlError>;

    /// Discard every statement executed since [`SchemaConnection::begin`].
    fn rollback(&mut self) -> Result<(), SqlError>;
}

/// Mirrored state of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableState {
    /// Column names in creation order.
    pub columns: Vec<String>,
    /// Foreign key name to referenced table.
    pub foreign_keys: BTreeMap<String, String>,
}

/// Mirrored state of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    /// Table the trigger is attached to.
    pub table: String,
    /// Event it fires on.
    pub event: TriggerEvent,
    /// Columns it assigns.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct SchemaState {
    tables: BTreeMap<String, TableState>,
    triggers: BTreeMap<String, TriggerState>,
    foreign_key_checks_off: bool,
}

/// In-memory schema that applies statements the way a relational server
/// would, including its failures.
///
/// Only one trigger per table and event is allowed, mirroring the server
/// limitation that timestamp triggers work around.
#[derive(Debug, Default)]
pub struct MemorySchema {
    state: SchemaState,
    log: Vec<String>,
    snapshot: Option<(SchemaState, usize)>,
    failures: Vec<String>,
}

impl MemorySchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement whose SQL contains `pattern` fail.
    pub fn fail_on(&mut self, pattern: impl Into<String>) {
        self.failures.push(pattern.into());
    }

    /// Remove all injected failures.
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// SQL of every committed (or auto-committed) statement, in order.
    pub fn statements(&self) -> &[String] {
        &self.log
    }

    /// Forget the statement log.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Check if a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.state.tables.contains_key(table)
    }

    /// Names of every table.
    pub fn table_names(&self) -> Vec<&str> {
        self.state.tables.keys().map(String::as_str).collect()
    }

    /// State of a table.
    pub fn table(&self, table: &str) -> Option<&TableState> {
        self.state.tables.get(table)
    }

    /// Columns of a table.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.state.tables.get(table).map(|t| t.columns.as_slice())
    }

    /// State of a trigger.
    pub fn trigger(&self, name: &str) -> Option<&TriggerState> {
        self.state.triggers.get(name)
    }

    /// Triggers attached to a table.
    pub fn triggers_on(&self, table: &str) -> Vec<&str> {
        self.state
            .triggers
            .iter()
            .filter(|(_, t)| t.table == table)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Foreign keys of other tables that reference `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&str, &str)> {
        self.state
            .tables
            .iter()
            .filter(|(name, _)| name.as_str() != table)
            .flat_map(|(name, state)| {
                state
                    .foreign_keys
                    .iter()
                    .filter(|(_, referenced)| referenced.as_str() == table)
                    .map(move |(fk, _)| (name.as_str(), fk.as_str()))
            })
            .collect()
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableState, SqlError> {
        self.state
            .tables
            .get_mut(table)
            .ok_or_else(|| SqlError::NotFound {
                object: format!("table {table}"),
            })
    }

    fn apply(&mut self, statement: &Statement) -> Result<(), SqlError> {
        match statement {
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
                ..
            } => {
                if self.has_table(table.as_str()) {
                    if *if_not_exists {
                        return Ok(());
                    }
                    return Err(SqlError::AlreadyExists {
                        object: format!("table {}", table.as_str()),
                    });
                }
                self.state.tables.insert(
                    table.as_str().to_string(),
                    TableState {
                        columns: columns.iter().map(|c| c.name.as_str().to_string()).collect(),
                        foreign_keys: BTreeMap::new(),
                    },
                );
            }
            Statement::DropTable { table, if_exists } => {
                if !self.state.foreign_key_checks_off {
                    if let Some((referencing, fk)) =
                        self.referencing(table.as_str()).first().copied()
                    {
                        return Err(SqlError::Failed {
                            message: format!(
                                "cannot drop table {}: referenced by {fk} on {referencing}",
                                table.as_str()
                            ),
                        });
                    }
                }
                if self.state.tables.remove(table.as_str()).is_none() {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(SqlError::NotFound {
                        object: format!("table {}", table.as_str()),
                    });
                }
                self.state.triggers.retain(|_, t| t.table != table.as_str());
            }
            Statement::AddColumn { table, column } => {
                let name = column.name.as_str();
                let state = self.table_mut(table.as_str())?;
                if state.columns.iter().any(|c| c == name) {
                    return Err(SqlError::AlreadyExists {
                        object: format!("column {}.{name}", table.as_str()),
                    });
                }
                state.columns.push(name.to_string());
            }
            Statement::DropColumn { table, column } => {
                let state = self.table_mut(table.as_str())?;
                let before = state.columns.len();
                state.columns.retain(|c| c != column.as_str());
                if state.columns.len() == before {
                    return Err(SqlError::NotFound {
                        object: format!("column {}.{}", table.as_str(), column.as_str()),
                    });
                }
            }
            Statement::AddForeignKey {
                table,
                name,
                column,
                references,
                ..
            } => {
                if !self.has_table(references.as_str()) {
                    return Err(SqlError::NotFound {
                        object: format!("table {}", references.as_str()),
                    });
                }
                let state = self.table_mut(table.as_str())?;
                if !state.columns.iter().any(|c| c == column.as_str()) {
                    return Err(SqlError::NotFound {
                        object: format!("column {}.{}", table.as_str(), column.as_str()),
                    });
                }
                if state.foreign_keys.contains_key(name.as_str()) {
                    return Err(SqlError::AlreadyExists {
                        object: format!("foreign key {}", name.as_str()),
                    });
                }
                state
                    .foreign_keys
                    .insert(name.as_str().to_string(), references.as_str().to_string());
            }
            Statement::DropForeignKey { table, name } => {
                let state = self.table_mut(table.as_str())?;
                if state.foreign_keys.remove(name.as_str()).is_none() {
                    return Err(SqlError::NotFound {
                        object: format!("foreign key {}", name.as_str()),
                    });
                }
            }
            Statement::DropTrigger { name } => {
                self.state.triggers.remove(name.as_str());
            }
            Statement::ForeignKeyChecks { enabled } => {
                self.state.foreign_key_checks_off = !enabled;
            }
            Statement::CreateTrigger {
                name,
                event,
                table,
                assignments,
            } => {
                if !self.has_table(table.as_str()) {
                    return Err(SqlError::NotFound {
                        object: format!("table {}", table.as_str()),
                    });
                }
                let clash = self.state.triggers.contains_key(name.as_str())
                    || self
                        .state
                        .triggers
                        .values()
                        .any(|t| t.table == table.as_str() && t.event == *event);
                if clash {
                    return Err(SqlError::AlreadyExists {
                        object: format!("{event} trigger on {}", table.as_str()),
                    });
                }
                self.state.triggers.insert(
                    name.as_str().to_string(),
                    TriggerState {
                        table: table.as_str().to_string(),
                        event: *event,
                        columns: assignments
                            .iter()
                            .map(|(c, _)| c.as_str().to_string())
                            .collect(),
                    },
                );
            }
        }
        Ok(())
    }
}

impl SchemaConnection for MemorySchema {
    fn execute(&mut self, statement: &Statement) -> Result<(), SqlError> {
        let sql = statement.to_string();
        if let Some(pattern) = self.failures.iter().find(|p| sql.contains(p.as_str())) {
            return Err(SqlError::Failed {
                message: format!("injected failure matching {pattern:?}"),
            });
        }
        self.apply(statement)?;
        self.log.push(sql);
        Ok(())
    }

    fn begin(&mut self) -> Result<(), SqlError> {
        if self.snapshot.is_some() {
            return Err(SqlError::Failed {
                message: "transaction already open".to_string(),
            });
        }
        self.snapshot = Some((self.state.clone(), self.log.len()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| SqlError::Failed {
                message: "no open transaction".to_string(),
            })
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        let (state, log_len) = self.snapshot.take().ok_or_else(|| SqlError::Failed {
            message: "no open transaction".to_string(),
        })?;
        self.state = state;
        self.log.truncate(log_len);
        Ok(())
    }
}
