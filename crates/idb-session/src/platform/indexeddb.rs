//! IndexedDB engine over `web-sys`.
//!
//! Every `IDBRequest` and `IDBTransaction` gets a pair of handlers of which only one fires
//! (`success`/`error`, `complete`/`abort`). The pair is owned by a shared slot: whichever
//! handler runs first detaches both from the target and frees them, so nothing captured by the
//! unused handler outlives the request. Cursor requests fire `success` once per step;
//! [`IndexedDbCursor::advance`] installs a fresh pair once `continue()` has succeeded.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect, JSON};
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    Event, IdbCursorWithValue, IdbDatabase, IdbFactory, IdbObjectStore, IdbOpenDbRequest,
    IdbRequest, IdbTransaction, IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::bridge::{self, Request};
use crate::engine::{Connection, Cursor, Engine, ObjectStore, TxMode};
use crate::{Result, StoreError};

type Handler = Closure<dyn FnMut(Event)>;
type UpgradeHandler = Closure<dyn FnMut(IdbVersionChangeEvent)>;
type UpgradeSlot = Rc<RefCell<Option<UpgradeHandler>>>;

fn to_js(value: &Value) -> Result<JsValue> {
    Ok(JSON::parse(&value.to_string())?)
}

fn from_js(value: &JsValue) -> Result<Option<Value>> {
    if value.is_undefined() {
        return Ok(None);
    }
    let text: String = JSON::stringify(value)?.into();
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| StoreError::Data(err.to_string()))
}

fn key_to_string(key: &JsValue) -> Result<String> {
    match key.as_string() {
        Some(key) => Ok(key),
        None => Ok(JSON::stringify(key)?.into()),
    }
}

fn request_error(request: &IdbRequest) -> StoreError {
    match request.error() {
        Ok(Some(ex)) => StoreError::from_dom_exception(&ex),
        Ok(None) => StoreError::Aborted("request failed without an error".to_owned()),
        Err(err) => err.into(),
    }
}

/// The request an event was dispatched to.
fn request_of(event: &Event) -> Result<IdbRequest> {
    let target = event
        .target()
        .ok_or_else(|| StoreError::Aborted("event has no target".to_owned()))?;
    target
        .dyn_into::<IdbRequest>()
        .map_err(|target| StoreError::from(JsValue::from(target)))
}

/// Two mutually exclusive handlers. The first one to fire calls `detach`, releases both
/// closures and runs its callback; the other one never runs.
fn exclusive<A, B, D>(on_a: A, on_b: B, detach: D) -> (Function, Function)
where
    A: FnOnce(Event) + 'static,
    B: FnOnce(Event) + 'static,
    D: FnOnce() + 'static,
{
    let slot: Rc<RefCell<Option<(Handler, Handler)>>> = Rc::default();
    let callbacks = Rc::new(RefCell::new(Some((on_a, on_b, detach))));

    let a = {
        let slot = Rc::clone(&slot);
        let callbacks = Rc::clone(&callbacks);
        Handler::new(move |event: Event| {
            let Some((on_a, _, detach)) = callbacks.borrow_mut().take() else {
                return;
            };
            detach();
            // wasm-bindgen defers freeing a closure that is dropped while it runs.
            drop(slot.borrow_mut().take());
            on_a(event);
        })
    };
    let b = {
        let slot = Rc::clone(&slot);
        Handler::new(move |event: Event| {
            let Some((_, on_b, detach)) = callbacks.borrow_mut().take() else {
                return;
            };
            detach();
            drop(slot.borrow_mut().take());
            on_b(event);
        })
    };

    let functions = (
        a.as_ref().unchecked_ref::<Function>().clone(),
        b.as_ref().unchecked_ref::<Function>().clone(),
    );
    *slot.borrow_mut() = Some((a, b));
    functions
}

/// Routes the next `success` or `error` event of `request` into a bridge request.
fn settle_on<T, S, F>(request: &IdbRequest, on_success: S, on_error: F) -> Request<T>
where
    T: 'static,
    S: FnOnce(&IdbRequest) -> Result<T> + 'static,
    F: FnOnce(&IdbRequest) -> StoreError + 'static,
{
    let (settle, pending) = bridge::request();
    let on_failure = settle.clone();
    let target = request.clone();

    let (success, failure) = exclusive(
        move |event| {
            settle.settle(request_of(&event).and_then(|request| on_success(&request)));
        },
        move |event| {
            let err = match request_of(&event) {
                Ok(request) => on_error(&request),
                Err(err) => err,
            };
            on_failure.reject(err);
        },
        move || {
            target.set_onsuccess(None);
            target.set_onerror(None);
        },
    );

    request.set_onsuccess(Some(&success));
    request.set_onerror(Some(&failure));
    pending
}

fn issue<T, S>(request: std::result::Result<IdbRequest, JsValue>, on_success: S) -> Request<T>
where
    T: 'static,
    S: FnOnce(&IdbRequest) -> Result<T> + 'static,
{
    match request {
        Ok(request) => settle_on(&request, on_success, request_error),
        Err(err) => Request::ready(Err(err.into())),
    }
}

fn has_method(target: &JsValue, name: &str) -> bool {
    Reflect::get(target, &JsValue::from_str(name))
        .map(|value| value.is_function())
        .unwrap_or(false)
}

/// Detaches and frees the upgrade handler once the open request has settled.
fn release_upgrade(request: &IdbRequest, upgrade: &UpgradeSlot) {
    if let Some(open) = request.dyn_ref::<IdbOpenDbRequest>() {
        open.set_onupgradeneeded(None);
    }
    drop(upgrade.borrow_mut().take());
}

/// Engine over an `IDBFactory`.
#[derive(Debug, Clone)]
pub struct IndexedDbEngine {
    factory: Option<IdbFactory>,
}

impl IndexedDbEngine {
    pub fn new(factory: IdbFactory) -> Self {
        Self {
            factory: Some(factory),
        }
    }

    /// The factory of the current global (`window` or a worker). When there is none, every
    /// open fails with [`StoreError::Unavailable`].
    pub fn from_global() -> Self {
        let global = js_sys::global();
        let factory = if let Some(window) = global.dyn_ref::<web_sys::Window>() {
            window.indexed_db().ok().flatten()
        } else if let Some(worker) = global.dyn_ref::<web_sys::WorkerGlobalScope>() {
            worker.indexed_db().ok().flatten()
        } else {
            None
        };
        Self { factory }
    }

    pub fn is_available(&self) -> bool {
        self.factory.is_some()
    }

    fn factory(&self) -> Result<&IdbFactory> {
        self.factory.as_ref().ok_or(StoreError::Unavailable)
    }
}

impl Engine for IndexedDbEngine {
    type Connection = IndexedDbConnection;

    fn open(&self, db_name: &str, store_name: &str) -> Request<IndexedDbConnection> {
        let open_request = match self.factory().and_then(|f| Ok(f.open(db_name)?)) {
            Ok(request) => request,
            Err(err) => return Request::ready(Err(err)),
        };

        let store_name = store_name.to_owned();
        // Only fires when the database is created, i.e. on its first open.
        let upgrade = UpgradeHandler::new(move |event: IdbVersionChangeEvent| {
            let created = request_of(&event)
                .and_then(|request| Ok(request.result()?.dyn_into::<IdbDatabase>()?))
                .and_then(|db| Ok(db.create_object_store(&store_name)?));
            if let Err(err) = created {
                tracing::warn!(
                    store = %store_name,
                    error = %err,
                    "failed to create object store"
                );
            }
        });
        open_request.set_onupgradeneeded(Some(upgrade.as_ref().unchecked_ref()));
        let upgrade: UpgradeSlot = Rc::new(RefCell::new(Some(upgrade)));
        let on_error_upgrade = Rc::clone(&upgrade);

        let db = db_name.to_owned();
        settle_on(
            &open_request,
            move |request| {
                release_upgrade(request, &upgrade);
                let db: IdbDatabase = request.result()?.dyn_into()?;
                Ok(IndexedDbConnection { db })
            },
            move |request| {
                release_upgrade(request, &on_error_upgrade);
                StoreError::Open {
                    db,
                    reason: request_error(request).to_string(),
                }
            },
        )
    }

    fn delete_database(&self, db_name: &str) -> Request<()> {
        match self.factory().and_then(|f| Ok(f.delete_database(db_name)?)) {
            Ok(request) => settle_on(&request, |_| Ok(()), request_error),
            Err(err) => Request::ready(Err(err)),
        }
    }
}

#[derive(Debug)]
pub struct IndexedDbConnection {
    db: IdbDatabase,
}

impl Connection for IndexedDbConnection {
    type Store = IndexedDbStore;

    fn transaction(&self, store_name: &str, mode: TxMode) -> Result<IndexedDbStore> {
        let mode = match mode {
            TxMode::ReadOnly => IdbTransactionMode::Readonly,
            TxMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let tx = self.db.transaction_with_str_and_mode(store_name, mode)?;
        let store = tx.object_store(store_name)?;
        let failure = Rc::new(RefCell::new(None));
        let done = transaction_outcome(&tx, Rc::clone(&failure));
        Ok(IndexedDbStore {
            tx,
            store,
            failure,
            done: RefCell::new(Some(done)),
        })
    }

    fn close(&self) {
        self.db.close();
    }
}

/// Settles on `complete` or `abort`, whichever the transaction fires.
fn transaction_outcome(
    tx: &IdbTransaction,
    failure: Rc<RefCell<Option<StoreError>>>,
) -> Request<()> {
    let (settle, pending) = bridge::request();
    let on_abort = settle.clone();
    let aborted = tx.clone();
    let target = tx.clone();

    let (complete, abort) = exclusive(
        move |_event| {
            settle.resolve(());
        },
        move |_event| {
            // A request that failed synchronously records its cause before aborting.
            let recorded = failure.borrow_mut().take();
            let err = recorded.unwrap_or_else(|| match aborted.error() {
                Some(ex) => StoreError::from_dom_exception(&ex),
                None => StoreError::Aborted("transaction was aborted".to_owned()),
            });
            on_abort.reject(err);
        },
        move || {
            target.set_oncomplete(None);
            target.set_onabort(None);
        },
    );

    tx.set_oncomplete(Some(&complete));
    tx.set_onabort(Some(&abort));
    pending
}

/// Object store handle bound to one IndexedDB transaction.
pub struct IndexedDbStore {
    tx: IdbTransaction,
    store: IdbObjectStore,
    failure: Rc<RefCell<Option<StoreError>>>,
    done: RefCell<Option<Request<()>>>,
}

impl IndexedDbStore {
    /// A write that throws synchronously does not abort the transaction by itself; abort it so
    /// earlier writes in the batch are rolled back too.
    fn write<S>(
        &self,
        request: std::result::Result<IdbRequest, JsValue>,
        on_success: S,
    ) -> Request<()>
    where
        S: FnOnce(&IdbRequest) -> Result<()> + 'static,
    {
        match request {
            Ok(request) => settle_on(&request, on_success, request_error),
            Err(err) => {
                let err = StoreError::from(err);
                self.failure.borrow_mut().get_or_insert_with(|| err.clone());
                let _ = self.tx.abort();
                Request::ready(Err(err))
            }
        }
    }
}

impl ObjectStore for IndexedDbStore {
    type Cursor = IndexedDbCursor;

    fn get(&self, key: &str) -> Request<Option<Value>> {
        issue(self.store.get(&JsValue::from_str(key)), |request| {
            from_js(&request.result()?)
        })
    }

    fn put(&self, key: &str, value: Value) -> Request<()> {
        let request = to_js(&value)
            .map_err(|err| JsValue::from_str(&err.to_string()))
            .and_then(|value| self.store.put_with_key(&value, &JsValue::from_str(key)));
        self.write(request, |_| Ok(()))
    }

    fn delete(&self, key: &str) -> Request<()> {
        self.write(self.store.delete(&JsValue::from_str(key)), |_| Ok(()))
    }

    fn clear(&self) -> Request<()> {
        self.write(self.store.clear(), |_| Ok(()))
    }

    fn get_all(&self) -> Option<Request<Vec<Value>>> {
        if !has_method(&self.store, "getAll") {
            return None;
        }
        Some(issue(self.store.get_all(), |request| {
            let values: Array = request.result()?.dyn_into()?;
            values
                .iter()
                .map(|value| from_js(&value).map(Option::unwrap_or_default))
                .collect()
        }))
    }

    fn get_all_keys(&self) -> Option<Request<Vec<String>>> {
        if !has_method(&self.store, "getAllKeys") {
            return None;
        }
        Some(issue(self.store.get_all_keys(), |request| {
            let keys: Array = request.result()?.dyn_into()?;
            keys.iter().map(|key| key_to_string(&key)).collect()
        }))
    }

    fn open_cursor(&self) -> Request<Option<IndexedDbCursor>> {
        issue(self.store.open_cursor(), IndexedDbCursor::from_request)
    }

    fn done(&self) -> Request<()> {
        self.done.borrow_mut().take().unwrap_or_else(|| {
            Request::ready(Err(StoreError::Aborted(
                "transaction outcome was already taken".to_owned(),
            )))
        })
    }

    fn abort(&self) {
        let _ = self.tx.abort();
    }
}

/// Cursor over an object store, positioned on one entry.
pub struct IndexedDbCursor {
    request: IdbRequest,
    cursor: IdbCursorWithValue,
}

impl IndexedDbCursor {
    fn from_request(request: &IdbRequest) -> Result<Option<Self>> {
        let result = request.result()?;
        if result.is_null() || result.is_undefined() {
            return Ok(None);
        }
        Ok(Some(Self {
            request: request.clone(),
            cursor: result.dyn_into()?,
        }))
    }
}

impl Cursor for IndexedDbCursor {
    fn key(&self) -> Result<String> {
        key_to_string(&self.cursor.key()?)
    }

    fn value(&self) -> Result<Value> {
        from_js(&self.cursor.value()?).map(Option::unwrap_or_default)
    }

    fn advance(self) -> Request<Option<Self>> {
        // The next step is dispatched asynchronously, so handlers installed after
        // `continue()` still see it.
        if let Err(err) = self.cursor.continue_() {
            return Request::ready(Err(err.into()));
        }
        settle_on(&self.request, Self::from_request, request_error)
    }
}
