//! Structured DDL statements.
//!
//! Statements are built as values and rendered to SQL text only when
//! executed or displayed, so every identifier passes through [`Ident`].

use super::error::MigrationError;
use std::fmt;

/// Quote character used for identifiers.
pub const QUOTE: char = '`';

/// A validated, escaped SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validate a name for use as an identifier.
    ///
    /// Names containing the quote character cannot be escaped and are rejected.
    pub fn new(name: impl Into<String>) -> Result<Self, MigrationError> {
        let name = name.into();
        if name.is_empty() || name.contains(QUOTE) || name.contains('\0') {
            return Err(MigrationError::InvalidIdentifier { name });
        }
        Ok(Self(name))
    }

    /// The unquoted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{QUOTE}{}{QUOTE}", self.0)
    }
}

/// A column definition: name, type and column specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: Ident,
    /// SQL type, e.g. `VARCHAR(64)`.
    pub sql_type: String,
    /// Trailing specs, e.g. `NOT NULL`.
    pub spec: String,
}

impl ColumnDef {
    /// Create a column definition.
    pub fn new(name: Ident, sql_type: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            name,
            sql_type: sql_type.into(),
            spec: spec.into(),
        }
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)?;
        if !self.spec.is_empty() {
            write!(f, " {}", self.spec)?;
        }
        Ok(())
    }
}

/// Row event a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerEvent {
    /// Before insert.
    Insert,
    /// Before update.
    Update,
}

impl TriggerEvent {
    /// Both events, in regeneration order.
    pub const ALL: [TriggerEvent; 2] = [TriggerEvent::Insert, TriggerEvent::Update];
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Insert => write!(f, "INSERT"),
            TriggerEvent::Update => write!(f, "UPDATE"),
        }
    }
}

/// A single DDL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `CREATE TABLE`.
    CreateTable {
        /// Table name.
        table: Ident,
        /// Add `IF NOT EXISTS`.
        if_not_exists: bool,
        /// Columns, primary key first.
        columns: Vec<ColumnDef>,
        /// Primary key column.
        primary_key: Ident,
        /// Storage engine.
        engine: String,
        /// Default character set.
        charset: String,
    },
    /// `DROP TABLE`.
    DropTable {
        /// Table name.
        table: Ident,
        /// Add `IF EXISTS`.
        if_exists: bool,
    },
    /// `ALTER TABLE .. ADD COLUMN`.
    AddColumn {
        /// Table name.
        table: Ident,
        /// New column.
        column: ColumnDef,
    },
    /// `ALTER TABLE .. DROP COLUMN`.
    DropColumn {
        /// Table name.
        table: Ident,
        /// Column to drop.
        column: Ident,
    },
    /// `ALTER TABLE .. ADD CONSTRAINT .. FOREIGN KEY`.
    AddForeignKey {
        /// Referencing table.
        table: Ident,
        /// Constraint name.
        name: Ident,
        /// Referencing column.
        column: Ident,
        /// Referenced table.
        references: Ident,
        /// Referenced column.
        referenced_column: Ident,
    },
    /// `ALTER TABLE .. DROP FOREIGN KEY`.
    DropForeignKey {
        /// Referencing table.
        table: Ident,
        /// Constraint name.
        name: Ident,
    },
    /// `DROP TRIGGER IF EXISTS`.
    DropTrigger {
        /// Trigger name.
        name: Ident,
    },
    /// `CREATE TRIGGER .. BEFORE .. FOR EACH ROW SET ..`.
    CreateTrigger {
        /// Trigger name.
        name: Ident,
        /// Event fired on.
        event: TriggerEvent,
        /// Table the trigger is attached to.
        table: Ident,
        /// `NEW.<column> = <expr>` assignments.
        assignments: Vec<(Ident, String)>,
    },
    /// `SET FOREIGN_KEY_CHECKS`, session scoped.
    ForeignKeyChecks {
        /// Whether referenced tables are protected.
        enabled: bool,
    },
}

impl Statement {
    /// Table the statement operates on, if any.
    pub fn table(&self) -> Option<&Ident> {
        match self {
            Statement::CreateTable { table, .. }
            | Statement::DropTable { table, .. }
            | Statement::AddColumn { table, .. }
            | Statement::DropColumn { table, .. }
            | Statement::AddForeignKey { table, .. }
            | Statement::DropForeignKey { table, .. }
            | Statement::CreateTrigger { table, .. } => Some(table),
            Statement::DropTrigger { .. } | Statement::ForeignKeyChecks { .. } => None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
                primary_key,
                engine,
                charset,
            } => {
                write!(f, "CREATE TABLE ")?;
                if *if_not_exists {
                    write!(f, "IF NOT EXISTS ")?;
                }
                write!(f, "{table} (")?;
                for column in columns {
                    write!(f, "{column}, ")?;
                }
                write!(
                    f,
                    "PRIMARY KEY({primary_key})) ENGINE={engine} CHARSET={charset}"
                )
            }
            Statement::DropTable { table, if_exists } => {
                if *if_exists {
                    write!(f, "DROP TABLE IF EXISTS {table}")
                } else {
                    write!(f, "DROP TABLE {table}")
                }
            }
            Statement::AddColumn { table, column } => {
                write!(f, "ALTER TABLE {table} ADD COLUMN {column}")
            }
            Statement::DropColumn { table, column } => {
                write!(f, "ALTER TABLE {table} DROP COLUMN {column}")
            }
            Statement::AddForeignKey {
                table,
                name,
                column,
                references,
                referenced_column,
            } => write!(
                f,
                "ALTER TABLE {table} ADD CONSTRAINT {name} FOREIGN KEY ({column}) REFERENCES {references}({referenced_column})"
            ),
            Statement::DropForeignKey { table, name } => {
                write!(f, "ALTER TABLE {table} DROP FOREIGN KEY {name}")
            }
            Statement::DropTrigger { name } => write!(f, "DROP TRIGGER IF EXISTS {name}"),
            Statement::ForeignKeyChecks { enabled } => {
                write!(f, "SET FOREIGN_KEY_CHECKS={}", u8::from(*enabled))
            }
            Statement::CreateTrigger {
                name,
                event,
                table,
                assignments,
            } => {
                write!(
                    f,
                    "CREATE TRIGGER {name} BEFORE {event} ON {table} FOR EACH ROW SET "
                )?;
                for (i, (column, expr)) in assignments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "NEW.{column} = {expr}")?;
                }
                Ok(())
            }
        }
    }
}
