//! C ABI exports for the EduBlog offline sync core.
//!
//! The UI layer opens one handle per database and passes it to every call.
//! All functions use C-compatible types and report errors via return codes;
//! structured results are written as JSON strings that the caller frees with
//! `edublog_free_string`.

use async_trait::async_trait;
use edublog_remote::{RemoteConfig, RestBackend};
use edublog_shell::{CacheShell, HttpFetcher, ShellConfig, ShellError};
use edublog_storage::{LocalStore, StorageError, StoreOpener, StoreOptions};
use edublog_sync::{
    BackgroundSync, OperationQueue, SyncConfig, SyncError, SyncResult, SyncTrigger,
};
use edublog_types::{Mutation, OperationKind, Record, SequenceId, Table, TypesError};
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Error codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdublogError {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer argument.
    NullPointer = 1,
    /// Invalid UTF-8 string.
    InvalidUtf8 = 2,
    /// JSON serialization error.
    JsonError = 3,
    /// Local storage error.
    StorageError = 4,
    /// Record not found.
    NotFound = 5,
    /// Sync or background-sync error.
    SyncError = 6,
    /// Asset cache shell error.
    ShellError = 7,
    /// Invalid argument (unknown table or operation, missing id).
    InvalidArgument = 8,
    /// Feature not configured for this handle.
    NotConfigured = 9,
    /// Unknown error.
    Unknown = 99,
}

impl From<SyncError> for EdublogError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Storage(e) => e.into(),
            SyncError::BackgroundSync(_) => EdublogError::SyncError,
            SyncError::Task(_) => EdublogError::Unknown,
        }
    }
}

impl From<StorageError> for EdublogError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Types(_) => EdublogError::InvalidArgument,
            StorageError::Serialization(_) => EdublogError::JsonError,
            _ => EdublogError::StorageError,
        }
    }
}

impl From<TypesError> for EdublogError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::Serialization(_) => EdublogError::JsonError,
            _ => EdublogError::InvalidArgument,
        }
    }
}

impl From<ShellError> for EdublogError {
    fn from(e: ShellError) -> Self {
        match e {
            ShellError::Storage(e) => e.into(),
            ShellError::Sync(e) => e.into(),
            _ => EdublogError::ShellError,
        }
    }
}

/// Configuration document accepted by `edublog_open`.
/// Missing sections fall back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FfiConfig {
    /// Database name, used when `edublog_open` is given a directory.
    store: StoreOptions,
    remote: RemoteConfig,
    sync: SyncConfig,
    shell: ShellConfig,
    /// Origin the app's static assets are served from. Enables the asset shell.
    asset_origin: Option<String>,
}

/// Opaque handle to an open EduBlog core.
pub struct EdublogHandle {
    runtime: Runtime,
    store: LocalStore,
    trigger: Arc<SyncTrigger>,
    shell: Option<CacheShell>,
}

/// Callback the host uses to register a background-sync tag.
/// Returns true if the registration was accepted.
pub type RegisterSyncFn = extern "C" fn(tag: *const c_char, user_data: *mut c_void) -> bool;

/// Background sync backed by a host callback.
struct CallbackBackgroundSync {
    register: RegisterSyncFn,
    /// Opaque host pointer, passed back untouched.
    user_data: usize,
}

#[async_trait]
impl BackgroundSync for CallbackBackgroundSync {
    async fn register(&self, tag: &str) -> SyncResult<()> {
        let tag = CString::new(tag).map_err(|e| SyncError::BackgroundSync(e.to_string()))?;
        if (self.register)(tag.as_ptr(), self.user_data as *mut c_void) {
            Ok(())
        } else {
            Err(SyncError::BackgroundSync(
                "host rejected registration".to_string(),
            ))
        }
    }
}

#[derive(Serialize)]
struct OnlineResult {
    reconnected: bool,
    report: Option<edublog_sync::DrainReport>,
}

// ── Helpers ──────────────────────────────────────────────────────

/// Reads a C string argument.
unsafe fn parse_cstr<'a>(ptr: *const c_char) -> Result<&'a str, EdublogError> {
    unsafe {
        if ptr.is_null() {
            return Err(EdublogError::NullPointer);
        }
        CStr::from_ptr(ptr)
            .to_str()
            .map_err(|_| EdublogError::InvalidUtf8)
    }
}

/// Serializes `value` into a newly allocated C string at `out`.
unsafe fn write_json_out<T: Serialize>(out: *mut *mut c_char, value: &T) -> EdublogError {
    unsafe {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(_) => return EdublogError::JsonError,
        };
        match CString::new(json) {
            Ok(c_json) => {
                *out = c_json.into_raw();
                EdublogError::Ok
            }
            Err(_) => EdublogError::JsonError,
        }
    }
}

unsafe fn handle_ref<'a>(handle: *mut EdublogHandle) -> Result<&'a EdublogHandle, EdublogError> {
    unsafe { handle.as_ref().ok_or(EdublogError::NullPointer) }
}

fn parse_table(table: &str) -> Result<Table, EdublogError> {
    table.parse().map_err(EdublogError::from)
}

fn build_mutation(operation: &str, payload: &str) -> Result<Mutation, EdublogError> {
    let kind: OperationKind = operation.parse()?;
    let payload: serde_json::Value =
        serde_json::from_str(payload).map_err(|_| EdublogError::JsonError)?;
    let record = Record::from_json(payload)?;
    Ok(match kind {
        OperationKind::Create => Mutation::Create(record),
        OperationKind::Update => Mutation::Update(record),
        OperationKind::Delete => Mutation::Delete { id: record.id },
    })
}

fn open_handle(db_path: &str, config: FfiConfig) -> Result<EdublogHandle, EdublogError> {
    let runtime = Runtime::new().map_err(|e| {
        warn!("failed to start runtime: {e}");
        EdublogError::Unknown
    })?;

    let opener = if db_path == ":memory:" {
        StoreOpener::in_memory()
    } else if Path::new(db_path).is_dir() {
        StoreOpener::from_options(Path::new(db_path), &config.store)
    } else {
        StoreOpener::new(db_path)
    };
    let store = runtime.block_on(opener.open()).map_err(|e| {
        warn!("failed to open store at {db_path}: {e}");
        EdublogError::from(e)
    })?;

    let guard = runtime.enter();
    let remote = RestBackend::new(config.remote).map_err(|e| {
        warn!("invalid remote configuration: {e}");
        EdublogError::InvalidArgument
    })?;
    let queue = Arc::new(OperationQueue::new(store.clone(), config.sync));
    let trigger = Arc::new(SyncTrigger::new(queue, Arc::new(remote)));

    let shell = match config.asset_origin {
        Some(origin) => {
            let fetcher = HttpFetcher::new(origin)?;
            let cache = store.asset_cache()?;
            let shell = CacheShell::new(cache, Arc::new(fetcher), config.shell)
                .with_trigger(trigger.clone());
            Some(shell)
        }
        None => None,
    };
    drop(guard);

    Ok(EdublogHandle {
        runtime,
        store,
        trigger,
        shell,
    })
}

// ── Lifecycle ────────────────────────────────────────────────────

/// Opens (or creates) the store at `db_path` and returns a handle.
///
/// `db_path` is a database file, a directory (the file is named by the
/// config's `store.name`) or `:memory:`. `config_json` may be null for
/// defaults.
///
/// # Safety
/// - `db_path` must be a valid null-terminated UTF-8 string.
/// - `config_json` must be null or a valid null-terminated UTF-8 string.
/// - `out_handle` must be a valid pointer. The handle must be released with
///   `edublog_close`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_open(
    db_path: *const c_char,
    config_json: *const c_char,
    out_handle: *mut *mut EdublogHandle,
) -> EdublogError {
    unsafe {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .try_init();

        if out_handle.is_null() {
            return EdublogError::NullPointer;
        }
        let path = match parse_cstr(db_path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let config: FfiConfig = if config_json.is_null() {
            FfiConfig::default()
        } else {
            let raw = match parse_cstr(config_json) {
                Ok(s) => s,
                Err(e) => return e,
            };
            match serde_json::from_str(raw) {
                Ok(c) => c,
                Err(e) => {
                    warn!("invalid config json: {e}");
                    return EdublogError::JsonError;
                }
            }
        };

        match open_handle(path, config) {
            Ok(handle) => {
                info!("opened edublog store at {path}");
                *out_handle = Box::into_raw(Box::new(handle));
                EdublogError::Ok
            }
            Err(e) => e,
        }
    }
}

/// Closes a handle and frees its resources.
///
/// # Safety
/// - `handle` must come from `edublog_open` and not be used afterwards, or be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_close(handle: *mut EdublogHandle) {
    unsafe {
        if !handle.is_null() {
            drop(Box::from_raw(handle));
        }
    }
}

/// Installs or removes (null `register`) the host's background-sync facility.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `user_data` is passed back to `register` as-is and must stay valid while
///   the callback is installed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_set_background_sync(
    handle: *mut EdublogHandle,
    register: Option<RegisterSyncFn>,
    user_data: *mut c_void,
) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        let background = register.map(|register| {
            Arc::new(CallbackBackgroundSync {
                register,
                user_data: user_data as usize,
            }) as Arc<dyn BackgroundSync>
        });
        handle.trigger.set_background_sync(background);
        EdublogError::Ok
    }
}

// ── Records ──────────────────────────────────────────────────────

/// Records a local write and schedules its sync.
///
/// `operation` is `CREATE`, `UPDATE` or `DELETE`; `payload_json` is the
/// record (an object with `id`). Writes the queued operation as JSON.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - String arguments must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_record(
    handle: *mut EdublogHandle,
    table: *const c_char,
    operation: *const c_char,
    payload_json: *const c_char,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let result = (|| {
            let handle = handle_ref(handle)?;
            let table = parse_table(parse_cstr(table)?)?;
            let mutation = build_mutation(parse_cstr(operation)?, parse_cstr(payload_json)?)?;
            let op = handle
                .runtime
                .block_on(handle.trigger.record(table, mutation))?;
            Ok::<_, EdublogError>(op)
        })();

        match result {
            Ok(op) => write_json_out(out_json, &op),
            Err(e) => e,
        }
    }
}

/// Gets a record by id.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - String arguments must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_get(
    handle: *mut EdublogHandle,
    table: *const c_char,
    id: *const c_char,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let result = (|| {
            let handle = handle_ref(handle)?;
            let table = parse_table(parse_cstr(table)?)?;
            let id = parse_cstr(id)?;
            handle.store.get(table, id)?.ok_or(EdublogError::NotFound)
        })();

        match result {
            Ok(record) => write_json_out(out_json, &record.data),
            Err(e) => e,
        }
    }
}

/// Lists every record in a table as a JSON array.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `table` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_list(
    handle: *mut EdublogHandle,
    table: *const c_char,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let result = (|| {
            let handle = handle_ref(handle)?;
            let table = parse_table(parse_cstr(table)?)?;
            Ok::<_, EdublogError>(handle.store.get_all(table)?)
        })();

        match result {
            Ok(records) => {
                let data: Vec<&serde_json::Value> = records.iter().map(|r| &r.data).collect();
                write_json_out(out_json, &data)
            }
            Err(e) => e,
        }
    }
}

// ── Queue ────────────────────────────────────────────────────────

/// Writes the pending operations, oldest first, as a JSON array.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_pending(
    handle: *mut EdublogHandle,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        match handle.store.list_operations() {
            Ok(ops) => write_json_out(out_json, &ops),
            Err(e) => e.into(),
        }
    }
}

/// Writes the dead letters as a JSON array.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_dead_letters(
    handle: *mut EdublogHandle,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        match handle.store.list_dead_letters() {
            Ok(letters) => write_json_out(out_json, &letters),
            Err(e) => e.into(),
        }
    }
}

/// Moves a dead letter back to the tail of the queue.
///
/// # Safety
/// - `handle` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_requeue_dead_letter(
    handle: *mut EdublogHandle,
    sequence_id: i64,
) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        match handle.store.requeue_dead_letter(SequenceId(sequence_id)) {
            Ok(Some(_)) => EdublogError::Ok,
            Ok(None) => EdublogError::NotFound,
            Err(e) => e.into(),
        }
    }
}

/// Drops a dead letter for good.
///
/// # Safety
/// - `handle` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_discard_dead_letter(
    handle: *mut EdublogHandle,
    sequence_id: i64,
) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        match handle.store.discard_dead_letter(SequenceId(sequence_id)) {
            Ok(true) => EdublogError::Ok,
            Ok(false) => EdublogError::NotFound,
            Err(e) => e.into(),
        }
    }
}

// ── Sync triggers ────────────────────────────────────────────────

/// Drains the queue now and writes the drain report as JSON.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_drain(
    handle: *mut EdublogHandle,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        match handle.runtime.block_on(handle.trigger.drain()) {
            Ok(report) => write_json_out(out_json, &report),
            Err(e) => e.into(),
        }
    }
}

/// Reports connectivity. An offline → online change drains the queue.
///
/// `out_json` may be null; otherwise it receives
/// `{ "reconnected": bool, "report": DrainReport | null }`.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `out_json` must be null or a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_set_online(
    handle: *mut EdublogHandle,
    online: bool,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        let reconnected = handle.trigger.set_online(online);
        let report = if reconnected {
            match handle.runtime.block_on(handle.trigger.on_reconnect()) {
                Ok(report) => Some(report),
                Err(e) => return e.into(),
            }
        } else {
            None
        };

        if out_json.is_null() {
            return EdublogError::Ok;
        }
        write_json_out(out_json, &OnlineResult { reconnected, report })
    }
}

/// Delivers a background-sync tag from the host. Writes the drain report,
/// or `null` if the tag is not ours.
///
/// # Safety
/// - `handle` must be a valid handle.
/// - `tag` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer. Free the result with `edublog_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_background_sync(
    handle: *mut EdublogHandle,
    tag: *const c_char,
    out_json: *mut *mut c_char,
) -> EdublogError {
    unsafe {
        if out_json.is_null() {
            return EdublogError::NullPointer;
        }
        let result = (|| {
            let handle = handle_ref(handle)?;
            let tag = parse_cstr(tag)?;
            let report = match &handle.shell {
                Some(shell) => handle.runtime.block_on(shell.handle_sync(tag))?,
                None => handle
                    .runtime
                    .block_on(handle.trigger.on_background_sync_signal(tag))?,
            };
            Ok::<_, EdublogError>(report)
        })();

        match result {
            Ok(report) => write_json_out(out_json, &report),
            Err(e) => e,
        }
    }
}

// ── Asset shell ──────────────────────────────────────────────────

/// Precaches the app's entry points. Requires `asset_origin` in the config.
///
/// # Safety
/// - `handle` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_install_assets(handle: *mut EdublogHandle) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        let Some(shell) = &handle.shell else {
            return EdublogError::NotConfigured;
        };
        match handle.runtime.block_on(shell.install()) {
            Ok(_) => EdublogError::Ok,
            Err(e) => e.into(),
        }
    }
}

/// Deletes asset caches from older versions.
///
/// # Safety
/// - `handle` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_activate_assets(handle: *mut EdublogHandle) -> EdublogError {
    unsafe {
        let handle = match handle_ref(handle) {
            Ok(h) => h,
            Err(e) => return e,
        };
        let Some(shell) = &handle.shell else {
            return EdublogError::NotConfigured;
        };
        match handle.runtime.block_on(shell.activate()) {
            Ok(_) => EdublogError::Ok,
            Err(e) => e.into(),
        }
    }
}

// ── Memory ───────────────────────────────────────────────────────

/// Frees a string allocated by this library.
///
/// # Safety
/// - `s` must be a string allocated by this library, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn edublog_free_string(s: *mut c_char) {
    unsafe {
        if !s.is_null() {
            drop(CString::from_raw(s));
        }
    }
}

/// Returns the library version. The string is static and must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn edublog_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
