//! Nested write payloads to SQL statements
//!
//! A mutation operation has root fields `create`, `update` and `delete`, each
//! taking a `data` argument keyed by root field name:
//!
//! ```graphql
//! mutation {
//!   create(data: { user: { name: "bob", class: { name: "1A" } } }) { user { id name } }
//!   delete(data: { club: [{ id: "...", version: 3 }] }) { club { id } }
//! }
//! ```
//!
//! Every payload node yields its own statement plus the statements of its
//! nested payloads, in `before ++ own ++ after` order:
//!
//! | relation      | create / update | delete |
//! |---------------|-----------------|--------|
//! | `ref` / `key` | before          | after  |
//! | `field`       | after           | before |
//! | `type`        | after           | before |
//!
//! Update and delete statements carry `id = ? AND version = ?` and must match
//! exactly one row when executed.

use crate::compiler::predicate::scalar_literal;
use crate::compiler::query::{QueryCompiler, json_row};
use crate::compiler::{Statement, StatementKind, sequence};
use crate::core::error::{EngineResult, InputError, SchemaError};
use crate::document::{FieldSelection, QueryContext};
use crate::schema::directive::{DirectiveModel, FieldInfo, Relation};
use crate::schema::model::{
    CREATED_AT_FIELD, EntityType, ID_FIELD, IS_DELETED_FIELD, UPDATED_AT_FIELD, VERSION_FIELD,
};
use crate::sql::ast::{BinaryOperator, Expr, Insert, JsonValue, Literal, Select, Update};
use crate::sql::{Dialect, SqlPrinter};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use uuid::Uuid;

const DATA_ARG: &str = "data";
const MUTATION_TYPENAME: &str = "Mutation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(MutationKind::Create),
            "update" => Some(MutationKind::Update),
            "delete" => Some(MutationKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    fn result_typename(&self) -> &'static str {
        match self {
            MutationKind::Create => "CreateResult",
            MutationKind::Update => "UpdateResult",
            MutationKind::Delete => "DeleteResult",
        }
    }
}

/// Where the response value of a mutation root field comes from
#[derive(Debug, Clone, PartialEq)]
pub enum RootOutput {
    /// Read back from the `data` object of [`MutationPlan::read_back`]
    ReadBack,
    /// Known without reading the database
    Static(Value),
}

/// Everything needed to execute one mutation operation
#[derive(Debug, Clone)]
pub struct MutationPlan {
    /// Sequenced statements, run in order inside one transaction
    pub statements: Vec<Statement>,
    /// SELECT run on the same transaction after the writes
    pub read_back: Option<Select>,
    /// Response keys of the root fields, in selection order
    pub roots: Vec<(String, RootOutput)>,
    /// Ids written per entity type
    pub touched: IndexMap<String, Vec<Uuid>>,
}

/// Ids of the payloads under one `data` key
#[derive(Debug, Clone)]
enum PayloadIds {
    One(Uuid),
    Many(Vec<Uuid>),
}

/// Statements of one payload subtree
struct Written {
    id: Uuid,
    statements: Vec<Statement>,
}

impl Written {
    fn reference(id: Uuid) -> Self {
        Self {
            id,
            statements: Vec::new(),
        }
    }
}

/// Statements and references collected while walking one payload node
#[derive(Default)]
struct Pending {
    before: Vec<Statement>,
    after: Vec<Statement>,
    requires: Vec<Uuid>,
}

impl Pending {
    fn assemble(self, own: Statement) -> Vec<Statement> {
        let mut statements = self.before;
        statements.push(own);
        statements.extend(self.after);
        statements
    }
}

/// Resolved to-one payload value
enum ToOneTarget {
    Null,
    Existing(Uuid),
    Created(Uuid),
}

/// Compiles the mutation operation of a [`QueryContext`]
pub struct MutationCompiler<'a> {
    ctx: &'a QueryContext,
    model: &'a DirectiveModel,
    printer: SqlPrinter,
    now: DateTime<Utc>,
    created: HashSet<Uuid>,
    in_progress: HashSet<Uuid>,
    touched: IndexMap<String, Vec<Uuid>>,
}

impl<'a> MutationCompiler<'a> {
    /// `now` is written to every `createdAt` / `updatedAt` of the mutation
    pub fn new(ctx: &'a QueryContext, dialect: Dialect, now: DateTime<Utc>) -> Self {
        Self {
            ctx,
            model: &ctx.schema,
            printer: SqlPrinter::new(dialect),
            now,
            created: HashSet::new(),
            in_progress: HashSet::new(),
            touched: IndexMap::new(),
        }
    }

    pub fn compile(mut self) -> EngineResult<MutationPlan> {
        let ctx = self.ctx;
        let mut query = QueryCompiler::new(ctx);
        let mut statements = Vec::new();
        let mut roots = Vec::new();
        let mut read_back = Vec::new();

        for root in ctx.root_fields()? {
            let key = root.response_key().to_string();
            if root.is_typename() {
                roots.push((key, RootOutput::Static(json!(MUTATION_TYPENAME))));
                continue;
            }

            let kind = MutationKind::parse(&root.name).ok_or_else(|| {
                InputError::UnknownMutation {
                    name: root.name.clone(),
                }
            })?;
            let data = root
                .argument(DATA_ARG)
                .ok_or_else(|| InputError::MissingArgument {
                    field: root.name.clone(),
                    argument: DATA_ARG.to_string(),
                })?
                .as_object()
                .ok_or_else(|| InputError::InvalidValue {
                    field: format!("{}({})", root.name, DATA_ARG),
                    message: "expected an object keyed by entity".to_string(),
                })?;

            let mut written: IndexMap<String, (String, PayloadIds)> = IndexMap::new();
            for (type_key, payload) in data {
                let type_name = self.model.root_field(type_key)?.type_name.clone();
                let ids = match payload {
                    Value::Array(items) => {
                        let mut ids = Vec::with_capacity(items.len());
                        for item in items {
                            let object = payload_object(&type_name, item)?;
                            let node = self.write_root(kind, &type_name, object)?;
                            statements.extend(node.statements);
                            ids.push(node.id);
                        }
                        PayloadIds::Many(ids)
                    }
                    other => {
                        let object = payload_object(&type_name, other)?;
                        let node = self.write_root(kind, &type_name, object)?;
                        statements.extend(node.statements);
                        PayloadIds::One(node.id)
                    }
                };
                written.insert(type_key.clone(), (type_name, ids));
            }

            let selected = ctx.collect_fields(&root.selections, "")?;
            match kind {
                MutationKind::Create | MutationKind::Update => {
                    let mut entries = Vec::with_capacity(selected.len());
                    for field in &selected {
                        let value = if field.is_typename() {
                            JsonValue::Text(kind.result_typename().to_string())
                        } else {
                            JsonValue::Nested(read_back_value(
                                &mut query,
                                written.get(&field.name),
                                field,
                            )?)
                        };
                        entries.push((field.response_key().to_string(), value));
                    }
                    read_back.push((key.clone(), JsonValue::Nested(Expr::JsonObject(entries))));
                    roots.push((key, RootOutput::ReadBack));
                }
                MutationKind::Delete => {
                    let mut object = Map::new();
                    for field in &selected {
                        let value = if field.is_typename() {
                            json!(kind.result_typename())
                        } else {
                            self.deleted_value(written.get(&field.name), field)?
                        };
                        object.insert(field.response_key().to_string(), value);
                    }
                    roots.push((key, RootOutput::Static(Value::Object(object))));
                }
            }
        }

        let statements = sequence(statements)?;
        tracing::debug!(
            statements = statements.len(),
            types = self.touched.len(),
            "compiled mutation"
        );

        Ok(MutationPlan {
            statements,
            read_back: (!read_back.is_empty()).then(|| json_row(Expr::JsonObject(read_back))),
            roots,
            touched: self.touched,
        })
    }

    fn write_root(
        &mut self,
        kind: MutationKind,
        type_name: &str,
        payload: &Map<String, Value>,
    ) -> EngineResult<Written> {
        match kind {
            MutationKind::Create => self.create(type_name, payload, None),
            MutationKind::Update => self.update(type_name, payload, None),
            MutationKind::Delete => self.delete(type_name, payload, None),
        }
    }

    /// Delete responses echo the payload ids without reading the database
    fn deleted_value(
        &self,
        written: Option<&(String, PayloadIds)>,
        field: &FieldSelection,
    ) -> EngineResult<Value> {
        let Some((type_name, ids)) = written else {
            return Ok(Value::Null);
        };
        let fields = self.ctx.collect_fields(&field.selections, type_name)?;
        let project = |id: &Uuid| {
            let mut object = Map::new();
            for f in &fields {
                let value = if f.is_typename() {
                    json!(type_name)
                } else if f.name == ID_FIELD {
                    json!(id.to_string())
                } else {
                    Value::Null
                };
                object.insert(f.response_key().to_string(), value);
            }
            Value::Object(object)
        };
        Ok(match ids {
            PayloadIds::One(id) => project(id),
            PayloadIds::Many(ids) => Value::Array(ids.iter().map(project).collect()),
        })
    }

    // =========================================================================
    // Create
    // =========================================================================

    fn create(
        &mut self,
        type_name: &str,
        payload: &Map<String, Value>,
        parent: Option<(&str, Uuid)>,
    ) -> EngineResult<Written> {
        let model = self.model;
        let entity = model.entity(type_name)?;
        let id = match payload.get(ID_FIELD).filter(|v| !v.is_null()) {
            Some(value) => parse_id(type_name, ID_FIELD, value)?,
            None => Uuid::new_v4(),
        };

        if self.created.contains(&id) {
            return Ok(Written::reference(id));
        }
        if !self.in_progress.insert(id) {
            return Err(InputError::ReferenceCycle {
                type_name: type_name.to_string(),
                id,
            }
            .into());
        }

        let mut columns: IndexMap<String, Expr> = IndexMap::new();
        columns.insert(column(model, type_name, ID_FIELD)?, uuid_expr(id));
        let mut pending = Pending::default();

        for info in model.fields_of(type_name)? {
            if is_engine_field(&info.field_name) {
                continue;
            }
            let Some(value) = payload.get(&info.field_name) else {
                continue;
            };

            match &info.relation {
                Relation::Column => {
                    let literal = scalar_literal(info, value)?;
                    self.require_literal(info, &literal, &mut pending);
                    columns.insert(column_of(info)?, Expr::Literal(literal));
                }
                Relation::ToOne {
                    target,
                    local_column,
                } => {
                    let target_id = match self.to_one(MutationKind::Create, info, target, value, &mut pending)? {
                        ToOneTarget::Null => Expr::Literal(Literal::Null),
                        ToOneTarget::Existing(target_id) | ToOneTarget::Created(target_id) => {
                            uuid_expr(target_id)
                        }
                    };
                    columns.insert(local_column.clone(), target_id);
                }
                Relation::ToMany {
                    target,
                    foreign_column,
                } => {
                    for child in children(info, value)? {
                        let node = self.create(target, child, Some((foreign_column.as_str(), id)))?;
                        pending.after.extend(node.statements);
                    }
                }
                Relation::ManyToMany {
                    target,
                    join_type,
                    left_column,
                    right_column,
                    ..
                } => {
                    for child in children(info, value)? {
                        let child_id = if is_reference(child) {
                            parse_id(target, ID_FIELD, &child[ID_FIELD])?
                        } else {
                            let node = self.create(target, child, None)?;
                            pending.after.extend(node.statements);
                            node.id
                        };
                        let link =
                            self.link_insert(join_type, left_column, right_column, id, child_id)?;
                        pending.after.push(link);
                    }
                }
            }
        }

        if let Some((foreign_column, parent_id)) = parent {
            columns.insert(foreign_column.to_string(), uuid_expr(parent_id));
            self.require(parent_id, &mut pending);
        }
        self.managed_insert_columns(entity, &mut columns)?;

        let (names, values): (Vec<String>, Vec<Expr>) = columns.into_iter().unzip();
        let sql = self.printer.insert(&Insert {
            table: entity.table.clone(),
            columns: names,
            values,
        });
        let own = Statement {
            type_name: type_name.to_string(),
            ordering_key: id,
            sql,
            kind: StatementKind::Insert,
            expects_single_row: false,
            creates: Some(id),
            requires: std::mem::take(&mut pending.requires),
        };

        self.in_progress.remove(&id);
        self.created.insert(id);
        self.touch(type_name, id);

        Ok(Written {
            id,
            statements: pending.assemble(own),
        })
    }

    fn managed_insert_columns(
        &self,
        entity: &EntityType,
        columns: &mut IndexMap<String, Expr>,
    ) -> EngineResult<()> {
        let managed = [
            (VERSION_FIELD, Expr::Literal(Literal::Int(1))),
            (CREATED_AT_FIELD, Expr::Literal(Literal::Timestamp(self.now))),
            (UPDATED_AT_FIELD, Expr::Literal(Literal::Timestamp(self.now))),
            (IS_DELETED_FIELD, Expr::boolean(false)),
        ];
        for (field, value) in managed {
            if entity.has_field(field) {
                columns.insert(column(self.model, &entity.name, field)?, value);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    fn update(
        &mut self,
        type_name: &str,
        payload: &Map<String, Value>,
        parent: Option<(&str, Uuid)>,
    ) -> EngineResult<Written> {
        let model = self.model;
        let entity = model.entity(type_name)?;
        require_managed(entity, VERSION_FIELD, MutationKind::Update)?;

        let id = required_id(type_name, payload)?;
        let version = required_version(type_name, payload)?;

        let mut predicates = self.lock_predicates(type_name, id, version)?;
        let mut sets: IndexMap<String, Expr> = IndexMap::new();
        let mut pending = Pending::default();

        for info in model.fields_of(type_name)? {
            if is_engine_field(&info.field_name) {
                continue;
            }
            let Some(value) = payload.get(&info.field_name) else {
                continue;
            };

            match &info.relation {
                Relation::Column => {
                    let literal = scalar_literal(info, value)?;
                    let column = column_of(info)?;
                    if info.target_type.is_some() {
                        self.require_literal(info, &literal, &mut pending);
                        predicates.push(match_column(column, literal));
                    } else {
                        sets.insert(column, Expr::Literal(literal));
                    }
                }
                Relation::ToOne {
                    target,
                    local_column,
                } => match self.to_one(MutationKind::Update, info, target, value, &mut pending)? {
                    ToOneTarget::Null => {
                        predicates.push(match_column(local_column.clone(), Literal::Null))
                    }
                    ToOneTarget::Existing(target_id) => predicates.push(match_column(
                        local_column.clone(),
                        Literal::Uuid(target_id),
                    )),
                    ToOneTarget::Created(target_id) => {
                        sets.insert(local_column.clone(), uuid_expr(target_id));
                    }
                },
                Relation::ToMany {
                    target,
                    foreign_column,
                } => {
                    for child in children(info, value)? {
                        let link = Some((foreign_column.as_str(), id));
                        let node = if has_id(child) {
                            self.update(target, child, link)?
                        } else {
                            self.create(target, child, link)?
                        };
                        pending.after.extend(node.statements);
                    }
                }
                Relation::ManyToMany {
                    target,
                    join_type,
                    left_column,
                    right_column,
                    ..
                } => {
                    for child in children(info, value)? {
                        if is_reference(child) {
                            let child_id = parse_id(target, ID_FIELD, &child[ID_FIELD])?;
                            let link = self.link_insert(
                                join_type,
                                left_column,
                                right_column,
                                id,
                                child_id,
                            )?;
                            pending.after.push(link);
                        } else if has_id(child) {
                            let node = self.update(target, child, None)?;
                            pending.after.extend(node.statements);
                        } else {
                            let node = self.create(target, child, None)?;
                            pending.after.extend(node.statements);
                            let link = self.link_insert(
                                join_type,
                                left_column,
                                right_column,
                                id,
                                node.id,
                            )?;
                            pending.after.push(link);
                        }
                    }
                }
            }
        }

        if let Some((foreign_column, parent_id)) = parent {
            predicates.push(match_column(foreign_column.to_string(), Literal::Uuid(parent_id)));
        }
        self.managed_update_columns(entity, &mut sets, false)?;

        let own = self.locked_update(entity, id, sets, predicates, StatementKind::Update, &mut pending);
        self.touch(type_name, id);

        Ok(Written {
            id,
            statements: pending.assemble(own),
        })
    }

    // =========================================================================
    // Delete
    // =========================================================================

    fn delete(
        &mut self,
        type_name: &str,
        payload: &Map<String, Value>,
        parent: Option<(&str, Uuid)>,
    ) -> EngineResult<Written> {
        let model = self.model;
        let entity = model.entity(type_name)?;
        require_managed(entity, VERSION_FIELD, MutationKind::Delete)?;
        require_managed(entity, IS_DELETED_FIELD, MutationKind::Delete)?;

        let id = required_id(type_name, payload)?;
        let version = required_version(type_name, payload)?;

        let mut predicates = self.lock_predicates(type_name, id, version)?;
        let mut sets: IndexMap<String, Expr> = IndexMap::new();
        let mut pending = Pending::default();

        for info in model.fields_of(type_name)? {
            if is_engine_field(&info.field_name) {
                continue;
            }
            let Some(value) = payload.get(&info.field_name) else {
                continue;
            };

            match &info.relation {
                // plain columns are left untouched by a soft delete
                Relation::Column if info.target_type.is_none() => {}
                Relation::Column => {
                    let literal = scalar_literal(info, value)?;
                    predicates.push(match_column(column_of(info)?, literal));
                }
                Relation::ToOne {
                    target,
                    local_column,
                } => {
                    let literal =
                        match self.to_one(MutationKind::Delete, info, target, value, &mut pending)? {
                            ToOneTarget::Null => Literal::Null,
                            ToOneTarget::Existing(target_id) | ToOneTarget::Created(target_id) => {
                                Literal::Uuid(target_id)
                            }
                        };
                    predicates.push(match_column(local_column.clone(), literal));
                }
                Relation::ToMany {
                    target,
                    foreign_column,
                } => {
                    for child in children(info, value)? {
                        let node = self.delete(target, child, Some((foreign_column.as_str(), id)))?;
                        pending.before.extend(node.statements);
                    }
                }
                Relation::ManyToMany {
                    target,
                    join_type,
                    left_column,
                    right_column,
                    ..
                } => {
                    for child in children(info, value)? {
                        let child_id = required_id(target, child)?;
                        let retire =
                            self.link_retire(join_type, left_column, right_column, id, child_id)?;
                        pending.before.push(retire);
                        if !is_reference(child) {
                            let node = self.delete(target, child, None)?;
                            pending.before.extend(node.statements);
                        }
                    }
                }
            }
        }

        if let Some((foreign_column, parent_id)) = parent {
            predicates.push(match_column(foreign_column.to_string(), Literal::Uuid(parent_id)));
        }
        self.managed_update_columns(entity, &mut sets, true)?;

        let own = self.locked_update(
            entity,
            id,
            sets,
            predicates,
            StatementKind::SoftDelete,
            &mut pending,
        );
        self.touch(type_name, id);

        Ok(Written {
            id,
            statements: pending.assemble(own),
        })
    }

    // =========================================================================
    // Shared pieces
    // =========================================================================

    /// Resolve a to-one payload value, compiling an inline payload
    fn to_one(
        &mut self,
        kind: MutationKind,
        info: &FieldInfo,
        target: &str,
        value: &Value,
        pending: &mut Pending,
    ) -> EngineResult<ToOneTarget> {
        let object = match value {
            Value::Null => return Ok(ToOneTarget::Null),
            Value::String(_) => {
                let target_id = parse_id(&info.type_name, &info.field_name, value)?;
                self.require(target_id, pending);
                return Ok(ToOneTarget::Existing(target_id));
            }
            Value::Object(object) => object,
            other => {
                return Err(InputError::InvalidValue {
                    field: format!("{}.{}", info.type_name, info.field_name),
                    message: format!("expected an id or an object, got {}", other),
                }
                .into());
            }
        };

        if is_reference(object) {
            let target_id = parse_id(target, ID_FIELD, &object[ID_FIELD])?;
            self.require(target_id, pending);
            return Ok(ToOneTarget::Existing(target_id));
        }

        let (node, created) = match kind {
            MutationKind::Create => (self.create(target, object, None)?, true),
            MutationKind::Update if has_id(object) => (self.update(target, object, None)?, false),
            MutationKind::Update => (self.create(target, object, None)?, true),
            MutationKind::Delete => (self.delete(target, object, None)?, false),
        };
        self.require(node.id, pending);

        match kind {
            MutationKind::Delete => pending.after.extend(node.statements),
            _ => pending.before.extend(node.statements),
        }
        Ok(if created {
            ToOneTarget::Created(node.id)
        } else {
            ToOneTarget::Existing(node.id)
        })
    }

    fn lock_predicates(&self, type_name: &str, id: Uuid, version: i64) -> EngineResult<Vec<Expr>> {
        Ok(vec![
            Expr::eq(
                Expr::bare_column(column(self.model, type_name, ID_FIELD)?),
                uuid_expr(id),
            ),
            Expr::eq(
                Expr::bare_column(column(self.model, type_name, VERSION_FIELD)?),
                Expr::Literal(Literal::Int(version)),
            ),
        ])
    }

    /// `version = version + 1`, `updatedAt = now` and, for deletes, `isDeleted = TRUE`
    fn managed_update_columns(
        &self,
        entity: &EntityType,
        sets: &mut IndexMap<String, Expr>,
        soft_delete: bool,
    ) -> EngineResult<()> {
        if soft_delete {
            sets.insert(
                column(self.model, &entity.name, IS_DELETED_FIELD)?,
                Expr::boolean(true),
            );
        }
        if entity.is_versioned() {
            let version = column(self.model, &entity.name, VERSION_FIELD)?;
            sets.insert(
                version.clone(),
                Expr::binary(
                    Expr::bare_column(version),
                    BinaryOperator::Plus,
                    Expr::Literal(Literal::Int(1)),
                ),
            );
        }
        if entity.has_field(UPDATED_AT_FIELD) {
            sets.insert(
                column(self.model, &entity.name, UPDATED_AT_FIELD)?,
                Expr::Literal(Literal::Timestamp(self.now)),
            );
        }
        Ok(())
    }

    fn locked_update(
        &self,
        entity: &EntityType,
        id: Uuid,
        sets: IndexMap<String, Expr>,
        predicates: Vec<Expr>,
        kind: StatementKind,
        pending: &mut Pending,
    ) -> Statement {
        let sql = self.printer.update(&Update {
            table: entity.table.clone(),
            assignments: sets.into_iter().collect(),
            selection: Expr::and_all(predicates),
        });
        Statement {
            type_name: entity.name.clone(),
            ordering_key: id,
            sql,
            kind,
            expects_single_row: true,
            creates: None,
            requires: std::mem::take(&mut pending.requires),
        }
    }

    fn link_insert(
        &mut self,
        join_type: &str,
        left_column: &str,
        right_column: &str,
        left: Uuid,
        right: Uuid,
    ) -> EngineResult<Statement> {
        let join = self.model.entity(join_type)?;
        let link_id = Uuid::new_v4();

        let mut columns: IndexMap<String, Expr> = IndexMap::new();
        columns.insert(column(self.model, join_type, ID_FIELD)?, uuid_expr(link_id));
        columns.insert(left_column.to_string(), uuid_expr(left));
        columns.insert(right_column.to_string(), uuid_expr(right));
        self.managed_insert_columns(join, &mut columns)?;

        let mut pending = Pending::default();
        self.require(left, &mut pending);
        self.require(right, &mut pending);

        let (names, values): (Vec<String>, Vec<Expr>) = columns.into_iter().unzip();
        let sql = self.printer.insert(&Insert {
            table: join.table.clone(),
            columns: names,
            values,
        });
        self.touch(join_type, link_id);

        Ok(Statement {
            type_name: join_type.to_string(),
            ordering_key: left.min(right),
            sql,
            kind: StatementKind::LinkInsert,
            expects_single_row: false,
            creates: Some(link_id),
            requires: pending.requires,
        })
    }

    /// Soft delete the live join rows between `left` and `right`
    fn link_retire(
        &mut self,
        join_type: &str,
        left_column: &str,
        right_column: &str,
        left: Uuid,
        right: Uuid,
    ) -> EngineResult<Statement> {
        let join = self.model.entity(join_type)?;
        require_managed(join, IS_DELETED_FIELD, MutationKind::Delete)?;

        let mut sets = IndexMap::new();
        self.managed_update_columns(join, &mut sets, true)?;
        let is_deleted = column(self.model, join_type, IS_DELETED_FIELD)?;

        let sql = self.printer.update(&Update {
            table: join.table.clone(),
            assignments: sets.into_iter().collect(),
            selection: Some(Expr::And(vec![
                match_column(left_column.to_string(), Literal::Uuid(left)),
                match_column(right_column.to_string(), Literal::Uuid(right)),
                match_column(is_deleted, Literal::Bool(false)),
            ])),
        });

        Ok(Statement {
            type_name: join_type.to_string(),
            ordering_key: left.min(right),
            sql,
            kind: StatementKind::LinkRetire,
            expects_single_row: false,
            creates: None,
            requires: Vec::new(),
        })
    }

    /// Record a reference to `id`
    ///
    /// The sequencer only orders against ids some statement of the batch
    /// creates, wherever in the payload that happens; other ids are existing
    /// rows.
    fn require(&self, id: Uuid, pending: &mut Pending) {
        if !pending.requires.contains(&id) {
            pending.requires.push(id);
        }
    }

    fn require_literal(&self, info: &FieldInfo, literal: &Literal, pending: &mut Pending) {
        if let (Some(_), Literal::Uuid(id)) = (&info.target_type, literal) {
            self.require(*id, pending);
        }
    }

    fn touch(&mut self, type_name: &str, id: Uuid) {
        let ids = self.touched.entry(type_name.to_string()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

/// Read-back expression for one selected `data` key
fn read_back_value(
    query: &mut QueryCompiler<'_>,
    written: Option<&(String, PayloadIds)>,
    field: &FieldSelection,
) -> EngineResult<Expr> {
    Ok(match written {
        None => Expr::Literal(Literal::Null),
        Some((type_name, PayloadIds::One(id))) => {
            query.entity_by_id(type_name, &field.selections, *id)?
        }
        Some((type_name, PayloadIds::Many(ids))) => Expr::JsonArray(
            ids.iter()
                .map(|id| query.entity_by_id(type_name, &field.selections, *id))
                .collect::<EngineResult<Vec<_>>>()?,
        ),
    })
}

/// Fields the engine writes itself; payload values for them are ignored
fn is_engine_field(name: &str) -> bool {
    name == ID_FIELD || EntityType::is_managed_field(name)
}

/// A payload holding only `id` points at an existing row
fn is_reference(payload: &Map<String, Value>) -> bool {
    payload.len() == 1 && payload.get(ID_FIELD).is_some_and(|v| !v.is_null())
}

fn has_id(payload: &Map<String, Value>) -> bool {
    payload.get(ID_FIELD).is_some_and(|v| !v.is_null())
}

fn payload_object<'v>(type_name: &str, value: &'v Value) -> EngineResult<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        InputError::InvalidValue {
            field: type_name.to_string(),
            message: format!("expected a payload object, got {}", value),
        }
        .into()
    })
}

fn children<'v>(info: &FieldInfo, value: &'v Value) -> EngineResult<Vec<&'v Map<String, Value>>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| payload_object(&info.field_name, item))
            .collect(),
        Value::Object(object) => Ok(vec![object]),
        other => Err(InputError::InvalidValue {
            field: format!("{}.{}", info.type_name, info.field_name),
            message: format!("expected a list of payload objects, got {}", other),
        }
        .into()),
    }
}

fn parse_id(type_name: &str, field: &str, value: &Value) -> EngineResult<Uuid> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            InputError::InvalidValue {
                field: format!("{}.{}", type_name, field),
                message: format!("expected a UUID, got {}", value),
            }
            .into()
        })
}

fn required_id(type_name: &str, payload: &Map<String, Value>) -> EngineResult<Uuid> {
    match payload.get(ID_FIELD).filter(|v| !v.is_null()) {
        Some(value) => parse_id(type_name, ID_FIELD, value),
        None => Err(InputError::MissingField {
            type_name: type_name.to_string(),
            field: ID_FIELD.to_string(),
        }
        .into()),
    }
}

fn required_version(type_name: &str, payload: &Map<String, Value>) -> EngineResult<i64> {
    let value = payload
        .get(VERSION_FIELD)
        .filter(|v| !v.is_null())
        .ok_or_else(|| InputError::MissingField {
            type_name: type_name.to_string(),
            field: VERSION_FIELD.to_string(),
        })?;
    value.as_i64().ok_or_else(|| {
        InputError::InvalidValue {
            field: format!("{}.{}", type_name, VERSION_FIELD),
            message: format!("expected an integer, got {}", value),
        }
        .into()
    })
}

fn require_managed(entity: &EntityType, field: &str, kind: MutationKind) -> EngineResult<()> {
    if entity.has_field(field) {
        Ok(())
    } else {
        Err(SchemaError::MissingManagedField {
            type_name: entity.name.clone(),
            field: field.to_string(),
            operation: kind.as_str().to_string(),
        }
        .into())
    }
}

fn column(model: &DirectiveModel, type_name: &str, field: &str) -> EngineResult<String> {
    column_of(model.field_info(type_name, field)?)
}

fn column_of(info: &FieldInfo) -> EngineResult<String> {
    info.column.clone().ok_or_else(|| {
        SchemaError::InvalidDirective {
            type_name: info.type_name.clone(),
            field: info.field_name.clone(),
            message: "field has no column".to_string(),
        }
        .into()
    })
}

fn uuid_expr(id: Uuid) -> Expr {
    Expr::Literal(Literal::Uuid(id))
}

/// `column = value`, or `column IS NULL` for null
fn match_column(column: String, value: Literal) -> Expr {
    match value {
        Literal::Null => Expr::IsNull {
            expr: Box::new(Expr::bare_column(column)),
            negated: false,
        },
        value => Expr::eq(Expr::bare_column(column), Expr::Literal(value)),
    }
}
