//! Unit-of-save engine for relata.
//!
//! [`Engine`] owns the sealed registry, the driver, the compiler, and the
//! validator, and orchestrates every write: single-row saves, updates, and
//! deletes, the transactional related-save cascade, and associative link
//! maintenance. Reads are delegated to `relata-query` through
//! [`Engine::find`].
//!
//! # Design Philosophy
//!
//! - **Explicit over implicit**: saving an instance never touches related
//!   rows unless `create_with_related` is asked to
//! - **Validation before I/O**: every value passes the validator before a
//!   statement is issued
//! - **One failure, surfaced once**: a cascade that fails mid-way rolls
//!   back and reports a single persistence error wrapping the cause
//! - **Cancellation honored between statements**: the context is checked
//!   before each round trip and all four outcome variants are matched
//!   after it
//!
//! # Example
//!
//! ```ignore
//! let mut engine = Engine::new(registry, driver, AnsiCompiler::default(), SchemaValidator::new());
//! engine.signals_mut().on("Author", Signal::PreSave, |author| {
//!     // veto or touch up the instance before the INSERT
//!     Ok(())
//! });
//!
//! let mut author = Instance::new("Author");
//! author.set("name", "Le Guin");
//! engine.save(&cx, &mut author).await;   // INSERT; generated key read back
//! author.set("name", "Ursula K. Le Guin");
//! engine.save(&cx, &mut author).await;   // UPDATE by primary key
//! ```

use asupersync::{Cx, Outcome};
use relata_core::{
    Driver, Error, Instance, LinkInfo, ModelRegistry, Related, RelationKind, Validator, Value,
    WriteOperation,
};
use relata_query::{
    CmpOp, ColumnRef, DeleteStatement, InsertStatement, Predicate, QueryContext, QuerySet,
    StatementCompiler, UpdateStatement,
};
use std::fmt;

pub mod signals;

pub use signals::{Handler, Signal, Signals};

// ============================================================================
// Engine
// ============================================================================

/// The write-side facade: registry plus collaborators plus signal table.
///
/// Built once during startup, after the registry is sealed, and shared by
/// reference afterwards. Signal handlers are registered through
/// [`Engine::signals_mut`] before the engine is shared.
pub struct Engine<D, C, V> {
    registry: ModelRegistry,
    driver: D,
    compiler: C,
    validator: V,
    signals: Signals,
}

impl<D, C, V> fmt::Debug for Engine<D, C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("models", &self.registry.len())
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

impl<D, C, V> Engine<D, C, V>
where
    D: Driver,
    C: StatementCompiler,
    V: Validator,
{
    pub fn new(registry: ModelRegistry, driver: D, compiler: C, validator: V) -> Self {
        Self {
            registry,
            driver,
            compiler,
            validator,
            signals: Signals::new(),
        }
    }

    /// Create an engine builder.
    #[must_use]
    pub fn builder() -> EngineBuilder<D, C, V> {
        EngineBuilder::new()
    }

    /// Replace the signal table wholesale; handy when handlers are
    /// assembled separately from the engine.
    #[must_use]
    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = signals;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut Signals {
        &mut self.signals
    }

    fn context(&self) -> QueryContext<'_, D, C, V> {
        QueryContext::new(&self.registry, &self.driver, &self.compiler, &self.validator)
    }

    /// Start a query against `model`.
    #[must_use]
    pub fn find(&self, model: impl Into<String>) -> QuerySet<'_, D, C, V> {
        QuerySet::new(self.context(), model)
    }

    // ========================================================================
    // Single-row writes
    // ========================================================================

    /// Insert when the primary key is unassigned, otherwise update by key.
    ///
    /// An instance that carries nothing but its key has no column changes
    /// to write; saving it succeeds without touching the database.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(model = %instance.model()))]
    pub async fn save(&self, cx: &Cx, instance: &mut Instance) -> Outcome<(), Error> {
        self.save_instance(cx, instance).await
    }

    /// Insert unconditionally, even when the primary key is assigned.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(model = %instance.model()))]
    pub async fn insert(&self, cx: &Cx, instance: &mut Instance) -> Outcome<(), Error> {
        self.insert_instance(cx, instance).await
    }

    /// Update the row `instance` points at, writing every set non-key
    /// field. Returns the driver's affected-row count.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(model = %instance.model()))]
    pub async fn update(&self, cx: &Cx, instance: &mut Instance) -> Outcome<u64, Error> {
        self.update_instance(cx, instance, None).await
    }

    /// Update only the named fields, all of which must carry values on
    /// the instance.
    #[tracing::instrument(level = "debug", skip(self, cx, instance, fields), fields(model = %instance.model()))]
    pub async fn update_fields(
        &self,
        cx: &Cx,
        instance: &mut Instance,
        fields: &[&str],
    ) -> Outcome<u64, Error> {
        self.update_instance(cx, instance, Some(fields)).await
    }

    /// Delete the row `instance` points at. Returns the affected-row
    /// count.
    ///
    /// Delete rules are enforced by the database: under `Restrict` a
    /// referenced row surfaces the driver's constraint failure, under
    /// `Cascade` the driver reports success and the referencing rows are
    /// gone with it.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(model = %instance.model()))]
    pub async fn delete(&self, cx: &Cx, instance: &mut Instance) -> Outcome<u64, Error> {
        let (model_name, table, pk_name, pk_column) = match self.registry.require(instance.model())
        {
            Ok(model) => (
                model.name.clone(),
                model.table.clone(),
                model.pk_name().to_string(),
                model.pk_field().column.clone(),
            ),
            Err(error) => return Outcome::Err(error),
        };
        let Some(key) = instance.get(&pk_name).filter(|v| !v.is_null()).cloned() else {
            return Outcome::Err(Error::config_for(
                &model_name,
                "cannot delete without an assigned primary key",
            ));
        };

        if let Err(message) = self.signals.emit(&model_name, Signal::PreDelete, instance) {
            return Outcome::Err(Error::write_hook(
                &model_name,
                WriteOperation::Delete,
                message,
            ));
        }

        let statement = DeleteStatement {
            table,
            predicate: Some(Predicate::Cmp {
                column: ColumnRef::new("", pk_column.as_str()),
                op: CmpOp::Eq,
                value: key,
            }),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.delete(&statement);
        let affected = match self.driver.execute(cx, &query).await {
            Outcome::Ok(n) => n,
            Outcome::Err(error) => {
                return Outcome::Err(Error::write_driver(
                    &model_name,
                    WriteOperation::Delete,
                    error,
                ));
            }
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };

        if let Err(message) = self.signals.emit(&model_name, Signal::PostDelete, instance) {
            tracing::warn!(model = %model_name, error = %message, "post-delete hook failed after committed delete");
            return Outcome::Err(Error::write_hook(
                &model_name,
                WriteOperation::Delete,
                message,
            ));
        }
        tracing::debug!(model = %model_name, affected, "deleted row");
        Outcome::Ok(affected)
    }

    async fn save_instance(&self, cx: &Cx, instance: &mut Instance) -> Outcome<(), Error> {
        let (pk_unset, has_writable) = match self.registry.require(instance.model()) {
            Ok(model) => (
                instance.is_unset(model.pk_name()),
                model
                    .fields
                    .iter()
                    .any(|field| !field.primary_key && instance.get(&field.name).is_some()),
            ),
            Err(error) => return Outcome::Err(error),
        };
        if pk_unset {
            return self.insert_instance(cx, instance).await;
        }
        if !has_writable {
            // A bare key carries no column changes.
            return Outcome::Ok(());
        }
        match self.update_instance(cx, instance, None).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(error) => Outcome::Err(error),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    async fn insert_instance(&self, cx: &Cx, instance: &mut Instance) -> Outcome<(), Error> {
        let model = match self.registry.require(instance.model()) {
            Ok(model) => model,
            Err(error) => return Outcome::Err(error),
        };

        if let Err(message) = self.signals.emit(&model.name, Signal::PreSave, instance) {
            return Outcome::Err(Error::write_hook(
                &model.name,
                WriteOperation::Insert,
                message,
            ));
        }

        // Declared defaults fill fields the caller never set at all; an
        // explicit NULL stays NULL and is judged by the validator.
        for field in &model.fields {
            if instance.get(&field.name).is_some() {
                continue;
            }
            if let Some(default) = &field.default {
                instance.set(field.name.clone(), default.clone());
            }
        }

        let mut columns = Vec::new();
        let mut params = Vec::new();
        let mut key_pending = false;
        for field in &model.fields {
            if field.primary_key && field.auto_increment && instance.is_unset(&field.name) {
                key_pending = true;
                continue;
            }
            let Some(value) = instance.get(&field.name) else {
                continue;
            };
            match self.validator.check(&model.name, field, value.clone()) {
                Ok(checked) => {
                    columns.push(field.column.clone());
                    params.push(checked);
                }
                Err(fault) => {
                    return Outcome::Err(Error::write_validation(
                        &model.name,
                        WriteOperation::Insert,
                        fault.field,
                        fault.message,
                    ));
                }
            }
        }

        let statement = InsertStatement {
            table: model.table.clone(),
            columns,
            values: params,
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.insert(&statement);
        let generated = match self.driver.insert(cx, &query).await {
            Outcome::Ok(generated) => generated,
            Outcome::Err(error) => {
                return Outcome::Err(Error::write_driver(
                    &model.name,
                    WriteOperation::Insert,
                    error,
                ));
            }
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };

        if key_pending {
            match generated {
                Some(key) => {
                    let pk = model.pk_field();
                    match self.validator.check(&model.name, pk, key) {
                        Ok(checked) => instance.set(pk.name.clone(), checked),
                        Err(fault) => {
                            return Outcome::Err(Error::write_validation(
                                &model.name,
                                WriteOperation::Insert,
                                fault.field,
                                fault.message,
                            ));
                        }
                    }
                }
                None => {
                    tracing::warn!(
                        model = %model.name,
                        "driver returned no generated key for an auto-increment insert"
                    );
                }
            }
        }

        if let Err(message) = self.signals.emit(&model.name, Signal::PostSave, instance) {
            tracing::warn!(model = %model.name, error = %message, "post-save hook failed after committed insert");
            return Outcome::Err(Error::write_hook(
                &model.name,
                WriteOperation::Insert,
                message,
            ));
        }
        tracing::debug!(model = %model.name, "inserted row");
        Outcome::Ok(())
    }

    async fn update_instance(
        &self,
        cx: &Cx,
        instance: &mut Instance,
        restrict: Option<&[&str]>,
    ) -> Outcome<u64, Error> {
        let model = match self.registry.require(instance.model()) {
            Ok(model) => model,
            Err(error) => return Outcome::Err(error),
        };
        let model_name = model.name.clone();
        let Some(key) = instance
            .get(model.pk_name())
            .filter(|v| !v.is_null())
            .cloned()
        else {
            return Outcome::Err(Error::config_for(
                &model_name,
                "cannot update without an assigned primary key",
            ));
        };

        if let Err(message) = self.signals.emit(&model_name, Signal::PreUpdate, instance) {
            return Outcome::Err(Error::write_hook(
                &model_name,
                WriteOperation::Update,
                message,
            ));
        }

        // Assignments come after the pre-hook so hook mutations are written.
        let mut assignments: Vec<(String, Value)> = Vec::new();
        match restrict {
            Some(names) => {
                for &name in names {
                    let Some(field) = model.field(name) else {
                        return Outcome::Err(Error::config_for(
                            &model_name,
                            format!("no field `{name}` to update"),
                        ));
                    };
                    if field.primary_key {
                        return Outcome::Err(Error::config_for(
                            &model_name,
                            "the primary key cannot be reassigned",
                        ));
                    }
                    let Some(value) = instance.get(name) else {
                        return Outcome::Err(Error::config_for(
                            &model_name,
                            format!("field `{name}` has no value to write"),
                        ));
                    };
                    match self.validator.check(&model_name, field, value.clone()) {
                        Ok(checked) => assignments.push((field.column.clone(), checked)),
                        Err(fault) => {
                            return Outcome::Err(Error::write_validation(
                                &model_name,
                                WriteOperation::Update,
                                fault.field,
                                fault.message,
                            ));
                        }
                    }
                }
            }
            None => {
                for field in &model.fields {
                    if field.primary_key {
                        continue;
                    }
                    let Some(value) = instance.get(&field.name) else {
                        continue;
                    };
                    match self.validator.check(&model_name, field, value.clone()) {
                        Ok(checked) => assignments.push((field.column.clone(), checked)),
                        Err(fault) => {
                            return Outcome::Err(Error::write_validation(
                                &model_name,
                                WriteOperation::Update,
                                fault.field,
                                fault.message,
                            ));
                        }
                    }
                }
            }
        }
        if assignments.is_empty() {
            return Outcome::Err(Error::config_for(
                &model_name,
                "update requires at least one assignment",
            ));
        }

        let statement = UpdateStatement {
            table: model.table.clone(),
            assignments,
            predicate: Some(Predicate::Cmp {
                column: ColumnRef::new("", model.pk_field().column.as_str()),
                op: CmpOp::Eq,
                value: key,
            }),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.update(&statement);
        let affected = match self.driver.execute(cx, &query).await {
            Outcome::Ok(n) => n,
            Outcome::Err(error) => {
                return Outcome::Err(Error::write_driver(
                    &model_name,
                    WriteOperation::Update,
                    error,
                ));
            }
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };

        if let Err(message) = self.signals.emit(&model_name, Signal::PostUpdate, instance) {
            tracing::warn!(model = %model_name, error = %message, "post-update hook failed after committed update");
            return Outcome::Err(Error::write_hook(
                &model_name,
                WriteOperation::Update,
                message,
            ));
        }
        tracing::debug!(model = %model_name, affected, "updated row");
        Outcome::Ok(affected)
    }

    // ========================================================================
    // Related-save cascade
    // ========================================================================

    /// Save `instance` and its loaded relations in one driver transaction.
    ///
    /// To-one parents save first (depth-first) so their keys can be
    /// stitched into this row's foreign-key columns, then the root, then
    /// loaded reverse-side children (each stitched with the root's key),
    /// then one associative row per loaded many-to-many target. Any
    /// failure rolls the transaction back and surfaces a single
    /// persistence error wrapping the cause.
    ///
    /// The loaded graph must be acyclic; stitching never follows an
    /// instance twice, so a cycle recurses until the stack gives out.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(model = %instance.model()))]
    pub async fn create_with_related(
        &self,
        cx: &Cx,
        instance: &mut Instance,
    ) -> Outcome<(), Error> {
        let model_name = instance.model().to_string();
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        match self.driver.begin(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(error) => {
                return Outcome::Err(Error::write_driver(
                    &model_name,
                    WriteOperation::Transaction,
                    error,
                ));
            }
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        }

        match self.save_tree(cx, instance).await {
            Outcome::Ok(()) => match self.driver.commit(cx).await {
                Outcome::Ok(()) => {
                    tracing::debug!(model = %model_name, "committed related save");
                    Outcome::Ok(())
                }
                Outcome::Err(error) => Outcome::Err(Error::write_driver(
                    &model_name,
                    WriteOperation::Transaction,
                    error,
                )),
                Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => Outcome::Panicked(payload),
            },
            Outcome::Err(error) => {
                self.roll_back(cx, &model_name).await;
                Outcome::Err(Error::rolled_back(&model_name, error))
            }
            Outcome::Cancelled(reason) => {
                self.roll_back(cx, &model_name).await;
                Outcome::Cancelled(reason)
            }
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// Best-effort rollback; the original failure stays primary.
    async fn roll_back(&self, cx: &Cx, model: &str) {
        match self.driver.rollback(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(error) => {
                tracing::warn!(model, error = %error, "rollback failed after cascade failure");
            }
            Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                tracing::warn!(model, "rollback interrupted after cascade failure");
            }
        }
    }

    /// Depth-first save of an instance and its loaded relations. Boxed
    /// because the recursion depth follows the loaded graph.
    fn save_tree<'a>(
        &'a self,
        cx: &'a Cx,
        instance: &'a mut Instance,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Outcome<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let model_name;
            let pk_name;
            let to_one: Vec<(String, String)>;
            let reverse: Vec<(String, String, String)>;
            let links: Vec<(String, String, LinkInfo)>;
            {
                let model = match self.registry.require(instance.model()) {
                    Ok(model) => model,
                    Err(error) => return Outcome::Err(error),
                };
                model_name = model.name.clone();
                pk_name = model.pk_name().to_string();
                to_one = model
                    .relations
                    .values()
                    .filter(|rel| rel.kind.is_to_one())
                    .filter_map(|rel| rel.fk_field.clone().map(|fk| (rel.name.clone(), fk)))
                    .collect();
                reverse = model
                    .reverse_relations
                    .values()
                    .map(|rev| {
                        (
                            rev.name.clone(),
                            rev.target.clone(),
                            rev.forward_relation.clone(),
                        )
                    })
                    .collect();
                links = model
                    .relations
                    .values()
                    .filter(|rel| matches!(rel.kind, RelationKind::ManyToMany))
                    .filter_map(|rel| {
                        rel.link
                            .clone()
                            .map(|link| (rel.name.clone(), rel.target.clone(), link))
                    })
                    .collect();
            }

            // 1. Save loaded to-one parents and stitch their keys into
            //    this row's foreign-key columns.
            for (name, fk_field) in to_one {
                match instance.take_related(&name) {
                    Some(Related::One(Some(mut parent))) => {
                        let mut failure = None;
                        match self.save_tree(cx, &mut parent).await {
                            Outcome::Ok(()) => match self.registry.require(parent.model()) {
                                Ok(parent_model) => {
                                    match parent
                                        .get(parent_model.pk_name())
                                        .filter(|v| !v.is_null())
                                        .cloned()
                                    {
                                        Some(key) => instance.set(fk_field.clone(), key),
                                        None => {
                                            failure =
                                                Some(Outcome::Err(Error::write_validation(
                                                    &model_name,
                                                    WriteOperation::Insert,
                                                    Some(fk_field.clone()),
                                                    format!(
                                                        "saved parent for `{name}` has no primary key"
                                                    ),
                                                )));
                                        }
                                    }
                                }
                                Err(error) => failure = Some(Outcome::Err(error)),
                            },
                            other => failure = Some(other),
                        }
                        instance.set_related(name, Related::One(Some(parent)));
                        if let Some(outcome) = failure {
                            return outcome;
                        }
                    }
                    Some(other) => instance.set_related(name, other),
                    None => {}
                }
            }

            // 2. Save this row once its foreign keys are in place.
            match self.save_instance(cx, instance).await {
                Outcome::Ok(()) => {}
                other => return other,
            }
            let Some(root_key) = instance.get(&pk_name).filter(|v| !v.is_null()).cloned() else {
                return Outcome::Err(Error::write_validation(
                    &model_name,
                    WriteOperation::Insert,
                    Some(pk_name.clone()),
                    "no primary key available after save to stitch related rows",
                ));
            };

            // 3. Save loaded reverse-side children, stitching this row's
            //    key into their foreign-key columns. Reverse accessors of
            //    associative relations carry no foreign key; their rows
            //    are written by the link step on the declaring side.
            for (name, target, forward_name) in reverse {
                let Some(related) = instance.take_related(&name) else {
                    continue;
                };
                let fk_field = match self.registry.require(&target) {
                    Ok(child_model) => child_model
                        .relation(&forward_name)
                        .and_then(|rel| rel.fk_field.clone()),
                    Err(error) => {
                        instance.set_related(name, related);
                        return Outcome::Err(error);
                    }
                };
                let Some(fk_field) = fk_field else {
                    instance.set_related(name, related);
                    continue;
                };
                match related {
                    Related::Many(mut children) => {
                        let mut failure = None;
                        for child in &mut children {
                            child.set(fk_field.clone(), root_key.clone());
                            match self.save_tree(cx, child).await {
                                Outcome::Ok(()) => {}
                                other => {
                                    failure = Some(other);
                                    break;
                                }
                            }
                        }
                        instance.set_related(name, Related::Many(children));
                        if let Some(outcome) = failure {
                            return outcome;
                        }
                    }
                    Related::One(Some(mut child)) => {
                        child.set(fk_field.clone(), root_key.clone());
                        let saved = self.save_tree(cx, &mut child).await;
                        instance.set_related(name, Related::One(Some(child)));
                        match saved {
                            Outcome::Ok(()) => {}
                            other => return other,
                        }
                    }
                    other => instance.set_related(name, other),
                }
            }

            // 4. Save brand-new link targets and write one associative
            //    row per loaded many-to-many child. Targets that already
            //    carry a key are linked as-is, not rewritten.
            for (name, target, link) in links {
                match instance.take_related(&name) {
                    Some(Related::Many(mut children)) => {
                        let target_pk = match self.registry.require(&target) {
                            Ok(target_model) => target_model.pk_name().to_string(),
                            Err(error) => {
                                instance.set_related(name, Related::Many(children));
                                return Outcome::Err(error);
                            }
                        };
                        let mut failure = None;
                        for child in &mut children {
                            if child.is_unset(&target_pk) {
                                match self.save_tree(cx, child).await {
                                    Outcome::Ok(()) => {}
                                    other => {
                                        failure = Some(other);
                                        break;
                                    }
                                }
                            }
                            let Some(child_key) =
                                child.get(&target_pk).filter(|v| !v.is_null()).cloned()
                            else {
                                failure = Some(Outcome::Err(Error::write_validation(
                                    &model_name,
                                    WriteOperation::Link,
                                    Some(target_pk.clone()),
                                    format!("link target for `{name}` has no primary key"),
                                )));
                                break;
                            };
                            let parent_key = root_key.clone();
                            match self
                                .insert_link_row(cx, &model_name, &link, parent_key, child_key)
                                .await
                            {
                                Outcome::Ok(()) => {}
                                other => {
                                    failure = Some(other);
                                    break;
                                }
                            }
                        }
                        instance.set_related(name, Related::Many(children));
                        if let Some(outcome) = failure {
                            return outcome;
                        }
                    }
                    Some(other) => instance.set_related(name, other),
                    None => {}
                }
            }

            Outcome::Ok(())
        })
    }

    // ========================================================================
    // Associative link maintenance
    // ========================================================================

    /// Insert one associative row tying `child` to `parent` through the
    /// named many-to-many relation.
    #[tracing::instrument(level = "debug", skip(self, cx, parent, child), fields(model = %parent.model(), relation))]
    pub async fn link(
        &self,
        cx: &Cx,
        parent: &Instance,
        relation: &str,
        child: &Instance,
    ) -> Outcome<(), Error> {
        let (link, parent_key, child_key) = match self.link_row(parent, relation, child) {
            Ok(parts) => parts,
            Err(error) => return Outcome::Err(error),
        };
        self.insert_link_row(cx, parent.model(), &link, parent_key, child_key)
            .await
    }

    /// Delete the associative row tying `child` to `parent`. Returns the
    /// affected-row count, zero when no such link existed.
    #[tracing::instrument(level = "debug", skip(self, cx, parent, child), fields(model = %parent.model(), relation))]
    pub async fn unlink(
        &self,
        cx: &Cx,
        parent: &Instance,
        relation: &str,
        child: &Instance,
    ) -> Outcome<u64, Error> {
        let (link, parent_key, child_key) = match self.link_row(parent, relation, child) {
            Ok(parts) => parts,
            Err(error) => return Outcome::Err(error),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let statement = DeleteStatement {
            table: link.table.clone(),
            predicate: Some(Predicate::And(vec![
                Predicate::Cmp {
                    column: ColumnRef::new("", link.source_column.as_str()),
                    op: CmpOp::Eq,
                    value: parent_key,
                },
                Predicate::Cmp {
                    column: ColumnRef::new("", link.target_column.as_str()),
                    op: CmpOp::Eq,
                    value: child_key,
                },
            ])),
        };
        let query = self.compiler.delete(&statement);
        match self.driver.execute(cx, &query).await {
            Outcome::Ok(n) => Outcome::Ok(n),
            Outcome::Err(error) => Outcome::Err(Error::write_driver(
                parent.model(),
                WriteOperation::Link,
                error,
            )),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// Resolve the associative wiring and both keys for a link/unlink.
    fn link_row(
        &self,
        parent: &Instance,
        relation: &str,
        child: &Instance,
    ) -> Result<(LinkInfo, Value, Value), Error> {
        let model = self.registry.require(parent.model())?;
        let Some(rel) = model.relation(relation) else {
            return Err(Error::config_for(
                &model.name,
                format!("no relation `{relation}` on `{}`", model.name),
            ));
        };
        let Some(link) = rel.link.clone() else {
            return Err(Error::config_for(
                &model.name,
                format!("relation `{relation}` is not many-to-many"),
            ));
        };
        if child.model() != rel.target {
            return Err(Error::config_for(
                &model.name,
                format!(
                    "relation `{relation}` links `{}` rows, got `{}`",
                    rel.target,
                    child.model()
                ),
            ));
        }
        let target = self.registry.require(&rel.target)?;
        let Some(parent_key) = parent.get(model.pk_name()).filter(|v| !v.is_null()).cloned() else {
            return Err(Error::config_for(
                &model.name,
                "cannot link without an assigned primary key",
            ));
        };
        let Some(child_key) = child.get(target.pk_name()).filter(|v| !v.is_null()).cloned() else {
            return Err(Error::config_for(
                &target.name,
                "cannot link without an assigned primary key",
            ));
        };
        Ok((link, parent_key, child_key))
    }

    async fn insert_link_row(
        &self,
        cx: &Cx,
        model: &str,
        link: &LinkInfo,
        source: Value,
        target: Value,
    ) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let statement = InsertStatement {
            table: link.table.clone(),
            columns: vec![link.source_column.clone(), link.target_column.clone()],
            values: vec![source, target],
        };
        let query = self.compiler.insert(&statement);
        match self.driver.insert(cx, &query).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(error) => {
                Outcome::Err(Error::write_driver(model, WriteOperation::Link, error))
            }
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }
}

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for assembling an [`Engine`] with a fluent API.
///
/// Handlers can be registered inline, so the whole engine reads as one
/// expression:
///
/// ```ignore
/// let engine = Engine::builder()
///     .on("Author", Signal::PreSave, |author| stamp_created_at(author))
///     .build_with(registry, driver, AnsiCompiler::default(), SchemaValidator::new());
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder<D: Driver, C: StatementCompiler, V: Validator> {
    signals: Signals,
    _marker: std::marker::PhantomData<(D, C, V)>,
}

impl<D: Driver, C: StatementCompiler, V: Validator> EngineBuilder<D, C, V> {
    /// Create a new engine builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signals: Signals::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Use a pre-assembled signal table.
    #[must_use]
    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = signals;
        self
    }

    /// Register a lifecycle handler for one model.
    #[must_use]
    pub fn on<F>(mut self, model: impl Into<String>, signal: Signal, handler: F) -> Self
    where
        F: Fn(&mut Instance) -> Result<(), String> + Send + Sync + 'static,
    {
        self.signals.on(model, signal, handler);
        self
    }

    /// Build the engine with the provided collaborators.
    pub fn build_with(
        self,
        registry: ModelRegistry,
        driver: D,
        compiler: C,
        validator: V,
    ) -> Engine<D, C, V> {
        Engine::new(registry, driver, compiler, validator).with_signals(self.signals)
    }
}

// ============================================================================
// Tests
// ============================================================================
