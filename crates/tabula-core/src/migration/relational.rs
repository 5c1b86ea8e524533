//! Relational migration handler: turns structural deltas into DDL.
//!
//! Naming and lifecycle rules:
//! - every class owns a table named after it, keyed by `id`;
//! - plain fields are columns of their class table;
//! - relation attributes are columns of an auxiliary table named after the
//!   owning class and the target type, which exists exactly while at least
//!   one attribute uses it;
//! - date/time columns populated with the current time are maintained by
//!   `BEFORE INSERT`/`BEFORE UPDATE` triggers, regenerated whenever the set
//!   of columns changes, because a table can carry only one
//!   current-timestamp default.

use super::columns::{self, NOW};
use super::config::RelationalConfig;
use super::connection::SchemaConnection;
use super::ddl::{ColumnDef, Ident, Statement, TriggerEvent};
use super::error::{MigrationError, SqlError};
use super::naming::{self, OBJECT_TABLE, PRIMARY_KEY, RELATION_TABLE};
use super::{Change, MigrationHandler};
use crate::error::Error;
use crate::model::{Attributes, ComponentId, ContentHash, FieldType, Model, Payload};
use tracing::{debug, info, instrument, warn};

/// One unit of a schema change.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// Execute; any failure aborts.
    Run(Statement),
    /// Execute; a missing object is the expected steady state.
    RunIgnoringMissing(Statement),
    /// Add a column, with optional drop-and-retry on a duplicate.
    AddColumn { table: Ident, column: ColumnDef },
}

/// Columns of one table that need timestamp triggers.
type TimestampColumns = Vec<(Ident, Vec<TriggerEvent>)>;

/// Where a field's column lives.
enum FieldTarget {
    /// No column of its own.
    None,
    /// A column of the class table.
    ClassTable { table: Ident, class: ComponentId },
    /// A column of a relation attribute table.
    RelationTable {
        table: Ident,
        class: ComponentId,
        target: ComponentId,
    },
}

/// Migration handler backed by a relational schema.
pub struct RelationalMigrationHandler<C: SchemaConnection> {
    conn: C,
    config: RelationalConfig,
    model_state: Option<ContentHash>,
}

impl<C: SchemaConnection> RelationalMigrationHandler<C> {
    /// Create a handler and make sure the permanent tables exist.
    pub fn new(conn: C, config: RelationalConfig) -> Result<Self, MigrationError> {
        let mut handler = Self {
            conn,
            config,
            model_state: None,
        };
        handler.ensure_permanent_tables()?;
        Ok(handler)
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// The underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Consume the handler, returning its connection.
    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Active configuration.
    pub fn config(&self) -> &RelationalConfig {
        &self.config
    }

    /// Hash of the last committed model state.
    pub fn model_state(&self) -> Option<ContentHash> {
        self.model_state
    }

    fn ensure_permanent_tables(&mut self) -> Result<(), MigrationError> {
        let object = Ident::new(OBJECT_TABLE)?;
        let relation = Ident::new(RELATION_TABLE)?;
        let reset = self.config.reset;
        let mut steps = Vec::new();

        if reset {
            info!("Recreating permanent tables");
            // Class and relation attribute tables keep their foreign keys.
            steps.push(Step::Run(Statement::ForeignKeyChecks { enabled: false }));
            for table in [&relation, &object] {
                steps.push(Step::Run(Statement::DropTable {
                    table: table.clone(),
                    if_exists: true,
                }));
            }
            steps.push(Step::Run(Statement::ForeignKeyChecks { enabled: true }));
        }

        let created_at = Ident::new("created_at")?;
        let updated_at = Ident::new("updated_at")?;
        steps.push(Step::Run(self.create_table(
            &object,
            !reset,
            vec![
                columns::surrogate(Ident::new(PRIMARY_KEY)?, true),
                ColumnDef::new(Ident::new("class_id")?, columns::SURROGATE_TYPE, "NOT NULL"),
                ColumnDef::new(Ident::new("type_id")?, columns::SURROGATE_TYPE, "NULL"),
                ColumnDef::new(Ident::new("label")?, "VARCHAR(255)", "NOT NULL"),
                ColumnDef::new(created_at.clone(), "DATETIME", "NULL"),
                ColumnDef::new(updated_at.clone(), "DATETIME", "NULL"),
            ],
        )?));
        steps.push(Step::Run(self.create_table(
            &relation,
            !reset,
            vec![
                columns::surrogate(Ident::new(PRIMARY_KEY)?, true),
                ColumnDef::new(Ident::new("superior_id")?, columns::SURROGATE_TYPE, "NOT NULL"),
                ColumnDef::new(
                    Ident::new("subordinate_id")?,
                    columns::SURROGATE_TYPE,
                    "NOT NULL",
                ),
                ColumnDef::new(Ident::new("nature")?, "VARCHAR(32)", "NOT NULL"),
                ColumnDef::new(Ident::new("depth")?, "INT", "NOT NULL"),
                ColumnDef::new(Ident::new("rank")?, "INT", "NOT NULL"),
                ColumnDef::new(Ident::new("name")?, "VARCHAR(255)", "NULL"),
            ],
        )?));

        let timestamps = vec![
            (created_at, vec![TriggerEvent::Insert]),
            (updated_at, vec![TriggerEvent::Insert, TriggerEvent::Update]),
        ];
        steps.extend(trigger_steps(&object, &timestamps, true)?);

        self.apply(steps)
    }

    fn create_table(
        &self,
        table: &Ident,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
    ) -> Result<Statement, MigrationError> {
        Ok(Statement::CreateTable {
            table: table.clone(),
            if_not_exists,
            columns,
            primary_key: Ident::new(PRIMARY_KEY)?,
            engine: self.config.engine.clone(),
            charset: self.config.charset.clone(),
        })
    }

    /// Table keyed by `id` with an optional foreign key to a permanent table.
    fn keyed_table_steps(
        &self,
        table: &Ident,
        references: &str,
    ) -> Result<Vec<Step>, MigrationError> {
        let key = Ident::new(PRIMARY_KEY)?;
        let mut steps = vec![Step::Run(self.create_table(
            table,
            false,
            vec![columns::surrogate(key.clone(), false)],
        )?)];

        if self.config.referential_integrity {
            let destination = Ident::new(references)?;
            let name = naming::foreign_key(table, &destination)?;
            steps.push(Step::RunIgnoringMissing(Statement::DropForeignKey {
                table: table.clone(),
                name: name.clone(),
            }));
            steps.push(Step::Run(Statement::AddForeignKey {
                table: table.clone(),
                name,
                column: key.clone(),
                references: destination,
                referenced_column: key,
            }));
        }
        Ok(steps)
    }

    fn plan(
        &self,
        model: &Model,
        id: ComponentId,
        change: Change<'_>,
    ) -> Result<Vec<Step>, MigrationError> {
        match change {
            Change::Create(after) => self.plan_create(model, id, after),
            Change::Delete(before) => self.plan_delete(model, id, before),
            Change::Update { before, after } => plan_update(id, before, after).map(|()| Vec::new()),
        }
    }

    fn plan_create(
        &self,
        model: &Model,
        id: ComponentId,
        after: &Attributes,
    ) -> Result<Vec<Step>, MigrationError> {
        match &after.payload {
            Payload::Class(_) => {
                let table = naming::class_table(&after.name)?;
                self.keyed_table_steps(&table, OBJECT_TABLE)
            }
            Payload::FieldGroup(_) | Payload::Type(_) => Ok(Vec::new()),
            Payload::Field(def) => {
                let target = resolve_field_target(model, id, def.group, &def.fieldtype)?;
                if matches!(target, FieldTarget::None) {
                    return Ok(Vec::new());
                }
                let Some(column) =
                    columns::column_for(column_name(&after.name)?, &def.fieldtype, def.optional)
                else {
                    return Ok(Vec::new());
                };

                let mut steps = Vec::new();
                let (table, timestamps) = match target {
                    FieldTarget::None => return Ok(steps),
                    FieldTarget::ClassTable { table, class } => {
                        let timestamps = class_timestamps(model, class, None)?;
                        (table, timestamps)
                    }
                    FieldTarget::RelationTable {
                        table,
                        class,
                        target,
                    } => {
                        let users = relation_attributes(model, class, target)?;
                        if users.iter().all(|field| *field == id) {
                            steps.extend(self.keyed_table_steps(&table, RELATION_TABLE)?);
                        }
                        let timestamps = relation_timestamps(model, class, target, None)?;
                        (table, timestamps)
                    }
                };

                steps.push(Step::AddColumn {
                    table: table.clone(),
                    column,
                });
                steps.extend(trigger_steps(&table, &timestamps, true)?);
                Ok(steps)
            }
        }
    }

    fn plan_delete(
        &self,
        model: &Model,
        id: ComponentId,
        before: &Attributes,
    ) -> Result<Vec<Step>, MigrationError> {
        match &before.payload {
            Payload::Class(_) => {
                let table = naming::class_table(&before.name)?;
                let mut steps = clear_trigger_steps(&table)?;
                steps.push(Step::Run(Statement::DropTable {
                    table,
                    if_exists: false,
                }));
                Ok(steps)
            }
            Payload::FieldGroup(_) | Payload::Type(_) => Ok(Vec::new()),
            Payload::Field(def) => {
                if columns::sql_type(&def.fieldtype).is_none() {
                    return Ok(Vec::new());
                }
                let column = column_name(&before.name)?;

                match resolve_field_target(model, id, def.group, &def.fieldtype)? {
                    FieldTarget::None => Ok(Vec::new()),
                    FieldTarget::ClassTable { table, class } => {
                        let timestamps = class_timestamps(model, class, Some(id))?;
                        drop_column_steps(table, column, &timestamps)
                    }
                    FieldTarget::RelationTable {
                        table,
                        class,
                        target,
                    } => {
                        let remaining = relation_attributes(model, class, target)?
                            .into_iter()
                            .filter(|field| *field != id)
                            .count();
                        if remaining == 0 {
                            debug!(table = %table, "Last relation attribute removed, dropping table");
                            let mut steps = clear_trigger_steps(&table)?;
                            steps.push(Step::Run(Statement::DropTable {
                                table,
                                if_exists: false,
                            }));
                            return Ok(steps);
                        }
                        let timestamps = relation_timestamps(model, class, target, Some(id))?;
                        drop_column_steps(table, column, &timestamps)
                    }
                }
            }
        }
    }

    /// Run steps inside one schema transaction.
    fn apply(&mut self, steps: Vec<Step>) -> Result<(), MigrationError> {
        if steps.is_empty() {
            return Ok(());
        }

        self.conn.begin().map_err(|source| MigrationError::Statement {
            statement: "BEGIN".to_string(),
            source,
        })?;

        match self.run_steps(&steps) {
            Ok(()) => self.conn.commit().map_err(|source| MigrationError::Statement {
                statement: "COMMIT".to_string(),
                source,
            }),
            Err(e) => {
                if let Err(rollback) = self.conn.rollback() {
                    warn!(error = %rollback, "Rollback of schema change failed");
                }
                warn!(error = %e, "Schema change rolled back");
                Err(e)
            }
        }
    }

    fn run_steps(&mut self, steps: &[Step]) -> Result<(), MigrationError> {
        for step in steps {
            match step {
                Step::Run(statement) => self.execute(statement)?,
                Step::RunIgnoringMissing(statement) => match self.conn.execute(statement) {
                    Err(SqlError::NotFound { object }) => {
                        debug!(object = %object, "Nothing to drop");
                    }
                    other => other.map_err(|source| statement_error(statement, source))?,
                },
                Step::AddColumn { table, column } => self.add_column(table, column)?,
            }
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<(), MigrationError> {
        debug!(sql = %statement, "Executing");
        self.conn
            .execute(statement)
            .map_err(|source| statement_error(statement, source))
    }

    fn add_column(&mut self, table: &Ident, column: &ColumnDef) -> Result<(), MigrationError> {
        let add = Statement::AddColumn {
            table: table.clone(),
            column: column.clone(),
        };
        debug!(sql = %add, "Executing");
        match self.conn.execute(&add) {
            Err(SqlError::AlreadyExists { object }) if self.config.drop_and_retry => {
                warn!(object = %object, "Column already exists, dropping and retrying");
                self.execute(&Statement::DropColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                })?;
                self.execute(&add)
            }
            other => other.map_err(|source| statement_error(&add, source)),
        }
    }
}

impl<C: SchemaConnection> MigrationHandler for RelationalMigrationHandler<C> {
    #[instrument(skip(self, model, before, after), fields(id = %id))]
    fn register_change(
        &mut self,
        model: &Model,
        id: ComponentId,
        before: Option<&Attributes>,
        after: Option<&Attributes>,
    ) -> Result<(), MigrationError> {
        let change = Change::classify(id, before, after)?;
        let steps = self.plan(model, id, change)?;
        debug!(steps = steps.len(), "Planned schema change");
        self.apply(steps)
    }

    fn register_model_state(&mut self, _model: &Model, hash: ContentHash) {
        debug!(hash = %hash, "Model state recorded");
        self.model_state = Some(hash);
    }
}

/// Only link and presentation changes have no schema effect; everything else
/// would need an in-place table or column change.
fn plan_update(
    id: ComponentId,
    before: &Attributes,
    after: &Attributes,
) -> Result<(), MigrationError> {
    let unsupported = |what: String| Err(MigrationError::Unsupported { id, what });

    if before.name != after.name {
        return unsupported(format!("rename from {} to {}", before.name, after.name));
    }

    match (&before.payload, &after.payload) {
        (Payload::Class(a), Payload::Class(b)) => {
            if a.classtype != b.classtype {
                return unsupported(format!("classtype change to {}", b.classtype));
            }
        }
        (Payload::FieldGroup(a), Payload::FieldGroup(b)) => {
            if a.class != b.class {
                return unsupported("moving a field group to another class".to_string());
            }
        }
        (Payload::Field(a), Payload::Field(b)) => {
            if a.group != b.group {
                return unsupported("moving a field to another group".to_string());
            }
            if a.fieldtype != b.fieldtype {
                return unsupported(format!(
                    "column type change from {} to {}",
                    a.fieldtype.tag(),
                    b.fieldtype.tag()
                ));
            }
            if a.optional != b.optional {
                return unsupported("nullability change".to_string());
            }
        }
        (Payload::Type(a), Payload::Type(b)) => {
            if a.class != b.class {
                return unsupported("moving a type to another class".to_string());
            }
        }
        (a, b) => {
            return unsupported(format!("kind change from {} to {}", a.kind(), b.kind()));
        }
    }
    Ok(())
}

fn statement_error(statement: &Statement, source: SqlError) -> MigrationError {
    MigrationError::Statement {
        statement: statement.to_string(),
        source,
    }
}

fn context(id: ComponentId) -> impl Fn(Error) -> MigrationError {
    move |e| MigrationError::MissingContext {
        id,
        reason: e.to_string(),
    }
}

fn column_name(name: &str) -> Result<Ident, MigrationError> {
    if name == PRIMARY_KEY {
        return Err(MigrationError::ReservedName {
            name: name.to_string(),
        });
    }
    Ident::new(name)
}

fn resolve_field_target(
    model: &Model,
    id: ComponentId,
    group: ComponentId,
    fieldtype: &FieldType,
) -> Result<FieldTarget, MigrationError> {
    let class = model.class_of(group).map_err(context(id))?;
    let class_name = model.get(class).map_err(context(id))?.name();

    match fieldtype {
        FieldType::PrimaryKey | FieldType::TypeRelation { .. } => Ok(FieldTarget::None),
        FieldType::TypeRelationAttribute { descriptor, .. } => {
            let target = descriptor_target(model, *descriptor).map_err(context(id))?;
            let type_name = model.get(target).map_err(context(id))?.name();
            Ok(FieldTarget::RelationTable {
                table: naming::relation_table(class_name, type_name)?,
                class,
                target,
            })
        }
        _ => Ok(FieldTarget::ClassTable {
            table: naming::class_table(class_name)?,
            class,
        }),
    }
}

fn descriptor_target(model: &Model, descriptor: ComponentId) -> Result<ComponentId, Error> {
    match model.get(descriptor)?.as_field().map(|f| &f.fieldtype) {
        Some(FieldType::TypeRelation { target }) => Ok(*target),
        _ => Err(Error::CheckFailed {
            reason: format!("field {descriptor} is not a relation descriptor"),
        }),
    }
}

/// Attribute fields of `class` whose descriptor targets `target`.
fn relation_attributes(
    model: &Model,
    class: ComponentId,
    target: ComponentId,
) -> Result<Vec<ComponentId>, MigrationError> {
    let mut out = Vec::new();
    for field in model.fields_of_class(class) {
        if let Some(FieldType::TypeRelationAttribute { descriptor, .. }) =
            field.as_field().map(|f| &f.fieldtype)
        {
            if descriptor_target(model, *descriptor).map_err(context(field.id()))? == target {
                out.push(field.id());
            }
        }
    }
    Ok(out)
}

fn class_timestamps(
    model: &Model,
    class: ComponentId,
    exclude: Option<ComponentId>,
) -> Result<TimestampColumns, MigrationError> {
    let mut out = Vec::new();
    for field in model.fields_of_class(class) {
        let Some(def) = field.as_field() else { continue };
        if Some(field.id()) == exclude
            || matches!(def.fieldtype, FieldType::TypeRelationAttribute { .. })
        {
            continue;
        }
        let events = columns::now_events(&def.fieldtype);
        if !events.is_empty() {
            out.push((Ident::new(field.name())?, events));
        }
    }
    Ok(out)
}

fn relation_timestamps(
    model: &Model,
    class: ComponentId,
    target: ComponentId,
    exclude: Option<ComponentId>,
) -> Result<TimestampColumns, MigrationError> {
    let mut out = Vec::new();
    for id in relation_attributes(model, class, target)? {
        if Some(id) == exclude {
            continue;
        }
        let field = model.get(id).map_err(context(id))?;
        let events = field
            .as_field()
            .map(|f| columns::now_events(&f.fieldtype))
            .unwrap_or_default();
        if !events.is_empty() {
            out.push((Ident::new(field.name())?, events));
        }
    }
    Ok(out)
}

/// Drop both triggers of a table.
fn clear_trigger_steps(table: &Ident) -> Result<Vec<Step>, MigrationError> {
    TriggerEvent::ALL
        .into_iter()
        .map(|event| {
            Ok(Step::Run(Statement::DropTrigger {
                name: naming::trigger(table, event)?,
            }))
        })
        .collect()
}

/// Recreate the timestamp triggers of a table from its current columns.
///
/// A trigger with no column to set is left dropped.
fn trigger_steps(
    table: &Ident,
    timestamps: &[(Ident, Vec<TriggerEvent>)],
    drop_first: bool,
) -> Result<Vec<Step>, MigrationError> {
    let mut steps = Vec::new();
    for event in TriggerEvent::ALL {
        let name = naming::trigger(table, event)?;
        if drop_first {
            steps.push(Step::Run(Statement::DropTrigger { name: name.clone() }));
        }
        let assignments: Vec<(Ident, String)> = timestamps
            .iter()
            .filter(|(_, events)| events.contains(&event))
            .map(|(column, _)| (column.clone(), NOW.to_string()))
            .collect();
        if !assignments.is_empty() {
            steps.push(Step::Run(Statement::CreateTrigger {
                name,
                event,
                table: table.clone(),
                assignments,
            }));
        }
    }
    Ok(steps)
}

fn drop_column_steps(
    table: Ident,
    column: Ident,
    remaining: &[(Ident, Vec<TriggerEvent>)],
) -> Result<Vec<Step>, MigrationError> {
    let mut steps = clear_trigger_steps(&table)?;
    steps.push(Step::Run(Statement::DropColumn {
        table: table.clone(),
        column,
    }));
    steps.extend(trigger_steps(&table, remaining, false)?);
    Ok(steps)
}
