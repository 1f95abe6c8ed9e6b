mod corpus;
mod documents;
mod tokens;

pub use corpus::NewChunk;
pub use tokens::ApiTokenRecord;

use std::path::Path;
use std::sync::{Arc, Once};

use anyhow::Result;
use rusqlite::{Connection, ffi::sqlite3_auto_extension};
use tokio::sync::Mutex;
use tracing::info;

static VEC_EXTENSION: Once = Once::new();

fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| {
        // Load sqlite-vec extension globally for rusqlite
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut std::os::raw::c_char,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> std::os::raw::c_int,
            >(
                sqlite_vec::sqlite3_vec_init as *const ()
            )));
        }
    });
}

/// SQLite-backed documents, knowledge corpus and API tokens.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        register_vec_extension();
        let db = Connection::open(path)?;
        init_schema(&db, dimensions)?;
        info!("Store opened at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            dimensions,
        })
    }

    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        register_vec_extension();
        let db = Connection::open_in_memory()?;
        init_schema(&db, dimensions)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn init_schema(db: &Connection, dimensions: usize) -> Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS corpus_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_corpus_chunks_category ON corpus_chunks(category)",
        [],
    )?;

    db.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vss_corpus USING vec0(embedding float[{}])",
            dimensions
        ),
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS api_tokens (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}
