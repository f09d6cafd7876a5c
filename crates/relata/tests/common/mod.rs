//! Shared fixtures for the workspace integration tests: scripted and
//! always-failing drivers plus the Author/Book registry.
#![allow(dead_code)]

use relata::{
    AnsiCompiler, Cx, Driver, DriverError, Engine, Error, FieldDecl, FieldType, ModelDecl,
    ModelRegistry, Outcome, RegistryBuilder, RelationDecl, Row, SchemaValidator, SqlQuery, Value,
};
use std::collections::VecDeque;
use std::sync::Mutex;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn unwrap_outcome_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Ok(v) => panic!("unexpected success: {v:?}"),
        Outcome::Err(e) => e,
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn run<T>(body: impl std::future::Future<Output = T>) -> T {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(body)
}

/// Scripted driver: pops pre-loaded responses, logs every statement, and
/// records transaction boundaries.
pub struct StubDriver {
    fetches: Mutex<VecDeque<Result<Vec<Row>, DriverError>>>,
    executes: Mutex<VecDeque<Result<u64, DriverError>>>,
    inserts: Mutex<VecDeque<Result<Option<Value>, DriverError>>>,
    log: Mutex<Vec<SqlQuery>>,
    tx: Mutex<Vec<&'static str>>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            fetches: Mutex::new(VecDeque::new()),
            executes: Mutex::new(VecDeque::new()),
            inserts: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            tx: Mutex::new(Vec::new()),
        }
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.fetches.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_fetch_error(&self, err: DriverError) {
        self.fetches.lock().unwrap().push_back(Err(err));
    }

    pub fn push_affected(&self, n: u64) {
        self.executes.lock().unwrap().push_back(Ok(n));
    }

    pub fn push_execute_error(&self, err: DriverError) {
        self.executes.lock().unwrap().push_back(Err(err));
    }

    pub fn push_key(&self, key: Option<Value>) {
        self.inserts.lock().unwrap().push_back(Ok(key));
    }

    pub fn logged(&self) -> Vec<SqlQuery> {
        self.log.lock().unwrap().clone()
    }

    pub fn tx_log(&self) -> Vec<&'static str> {
        self.tx.lock().unwrap().clone()
    }
}

impl Driver for StubDriver {
    fn fetch(
        &self,
        _cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, DriverError>> + Send {
        self.log.lock().unwrap().push(query.clone());
        let next = self.fetches.lock().unwrap().pop_front();
        async move {
            match next {
                Some(Ok(rows)) => Outcome::Ok(rows),
                Some(Err(err)) => Outcome::Err(err),
                None => Outcome::Err(DriverError::statement("no scripted rows")),
            }
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<u64, DriverError>> + Send {
        self.log.lock().unwrap().push(query.clone());
        let next = self.executes.lock().unwrap().pop_front();
        async move {
            match next {
                Some(Ok(n)) => Outcome::Ok(n),
                Some(Err(err)) => Outcome::Err(err),
                None => Outcome::Err(DriverError::statement("no scripted count")),
            }
        }
    }

    fn insert(
        &self,
        _cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Option<Value>, DriverError>> + Send {
        self.log.lock().unwrap().push(query.clone());
        let next = self.inserts.lock().unwrap().pop_front();
        async move {
            match next {
                Some(Ok(key)) => Outcome::Ok(key),
                Some(Err(err)) => Outcome::Err(err),
                None => Outcome::Ok(None),
            }
        }
    }

    fn begin(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        self.tx.lock().unwrap().push("begin");
        async move { Outcome::Ok(()) }
    }

    fn commit(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        self.tx.lock().unwrap().push("commit");
        async move { Outcome::Ok(()) }
    }

    fn rollback(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        self.tx.lock().unwrap().push("rollback");
        async move { Outcome::Ok(()) }
    }
}

/// A driver that refuses every call; proves builders never touch it.
pub struct FailingDriver;

impl Driver for FailingDriver {
    fn fetch(
        &self,
        _cx: &Cx,
        _query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        _query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<u64, DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        _query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Option<Value>, DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }

    fn begin(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }

    fn commit(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }

    fn rollback(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send {
        async move { Outcome::Err(DriverError::statement("driver refused the call")) }
    }
}

/// Author has many Books; Book carries the `author_id` foreign key.
pub fn library_registry() -> ModelRegistry {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            ModelDecl::new("Author", "authors")
                .field(
                    FieldDecl::new("id", FieldType::BigInteger)
                        .primary_key(true)
                        .auto_increment(true),
                )
                .field(FieldDecl::new("name", FieldType::Text)),
        )
        .unwrap();
    builder
        .register(
            ModelDecl::new("Book", "books")
                .field(
                    FieldDecl::new("id", FieldType::BigInteger)
                        .primary_key(true)
                        .auto_increment(true),
                )
                .field(FieldDecl::new("title", FieldType::Text))
                .relation(RelationDecl::many_to_one("author", "Author").nullable(true)),
        )
        .unwrap();
    builder.finalize().unwrap()
}

pub fn library_engine<D: Driver>(driver: D) -> Engine<D, AnsiCompiler, SchemaValidator> {
    Engine::new(library_registry(), driver, AnsiCompiler::default(), SchemaValidator::new())
}
