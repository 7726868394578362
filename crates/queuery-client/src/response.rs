//! Lazy materialization of query results from gzip CSV shards.

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;

use crate::cast::cast_row;
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{Manifest, QueueryError, QueueryResult, ResultBody, Row, Value};

type ShardRecords = csv::StringRecordsIntoIter<MultiGzDecoder<Cursor<Vec<u8>>>>;

/// Fully read query output.
#[derive(Debug)]
pub enum Materialized {
    Rows(Vec<Row>),
    #[cfg(feature = "arrow")]
    Table(arrow_array::RecordBatch),
}

/// Rows of a finished query, fetched shard by shard on demand.
///
/// Every call to [`ResultStream::iter`] re-runs the full
/// fetch/decompress/parse pipeline from the first shard. Not `Sync`.
pub struct ResultStream {
    body: ResultBody,
    transport: Arc<dyn HttpTransport>,
    enable_cast: bool,
    shards_opened: Cell<usize>,
    manifest: RefCell<Option<Arc<Manifest>>>,
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("body", &self.body)
            .field("enable_cast", &self.enable_cast)
            .field("shards_opened", &self.shards_opened.get())
            .finish_non_exhaustive()
    }
}

impl ResultStream {
    pub fn new(body: ResultBody, transport: Arc<dyn HttpTransport>, enable_cast: bool) -> Self {
        Self {
            body,
            transport,
            enable_cast,
            shards_opened: Cell::new(0),
            manifest: RefCell::new(None),
        }
    }

    pub fn body(&self) -> &ResultBody {
        &self.body
    }

    pub fn enable_cast(&self) -> bool {
        self.enable_cast
    }

    /// Number of result shards.
    pub fn shard_count(&self) -> usize {
        self.body.data_file_urls().len()
    }

    /// Shards opened so far across all iterations.
    pub fn shards_opened(&self) -> usize {
        self.shards_opened.get()
    }

    /// Iterate rows, cast per the manifest when casting is enabled.
    ///
    /// Uncast rows carry every cell as [`Value::Text`]. The iterator stops
    /// after yielding its first error.
    pub fn iter(&self) -> Rows<'_> {
        Rows {
            raw: self.raw_rows(),
        }
    }

    /// Iterate rows as raw strings, ignoring the cast setting.
    pub fn raw_rows(&self) -> RawRows<'_> {
        RawRows {
            stream: self,
            next_shard: 0,
            current: None,
            done: false,
        }
    }

    /// Return the schema manifest, fetching it on first use or when `force` is set.
    pub fn fetch_manifest(&self, force: bool) -> QueueryResult<Arc<Manifest>> {
        if !force {
            if let Some(manifest) = self.manifest.borrow().as_ref() {
                return Ok(Arc::clone(manifest));
            }
        }

        let url = self.body.manifest_file_url().ok_or_else(|| {
            QueueryError::Configuration("Response does not contain manifest_file_url.".to_string())
        })?;

        tracing::debug!("Fetching manifest for query {} from {url}", self.body.id());
        let resp = self
            .transport
            .send(&HttpRequest::get(url))?
            .error_for_status()?;
        let manifest = Arc::new(Manifest::from_json(&resp.body)?);

        *self.manifest.borrow_mut() = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// The manifest if one has already been fetched.
    pub fn cached_manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.borrow().clone()
    }

    /// Read every row into memory.
    pub fn read(&self) -> QueueryResult<Vec<Row>> {
        self.iter().collect()
    }

    /// Read every row, optionally as a columnar table.
    ///
    /// Tables need the `arrow` feature; without it `as_table` fails with
    /// [`QueueryError::MissingDependency`] before anything is fetched.
    pub fn materialize(&self, as_table: bool) -> QueueryResult<Materialized> {
        if as_table {
            #[cfg(feature = "arrow")]
            return self.read_table().map(Materialized::Table);

            #[cfg(not(feature = "arrow"))]
            return Err(QueueryError::MissingDependency(
                "tabular output needs queuery-client built with the `arrow` feature".to_string(),
            ));
        }

        self.read().map(Materialized::Rows)
    }

    /// Read every row into an Arrow record batch.
    #[cfg(feature = "arrow")]
    pub fn read_table(&self) -> QueueryResult<arrow_array::RecordBatch> {
        let rows = self.read()?;
        let manifest = if self.enable_cast {
            Some(self.fetch_manifest(false)?)
        } else {
            self.cached_manifest()
        };
        crate::table::build_record_batch(&rows, manifest.as_deref(), self.enable_cast)
    }

    fn open_shard(&self, url: &str) -> QueueryResult<ShardRecords> {
        let resp = self
            .transport
            .send(&HttpRequest::get(url))?
            .error_for_status()?;

        self.shards_opened.set(self.shards_opened.get() + 1);
        tracing::debug!(
            "Opened shard {}/{} of query {} ({} bytes)",
            self.shards_opened.get(),
            self.shard_count(),
            self.body.id(),
            resp.body.len()
        );

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .escape(Some(b'\\'))
            .from_reader(MultiGzDecoder::new(Cursor::new(resp.body)));
        Ok(reader.into_records())
    }
}

impl<'a> IntoIterator for &'a ResultStream {
    type Item = QueueryResult<Row>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Raw string rows across all shards, in shard then file order.
pub struct RawRows<'a> {
    stream: &'a ResultStream,
    next_shard: usize,
    current: Option<ShardRecords>,
    done: bool,
}

impl RawRows<'_> {
    fn fail(&mut self, err: QueueryError) -> Option<QueueryResult<Vec<String>>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl Iterator for RawRows<'_> {
    type Item = QueueryResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(records) = self.current.as_mut() {
                match records.next() {
                    Some(Ok(record)) => {
                        return Some(Ok(record.iter().map(str::to_string).collect()))
                    }
                    Some(Err(e)) => return self.fail(e.into()),
                    None => self.current = None,
                }
            }

            let stream = self.stream;
            let Some(url) = stream.body.data_file_urls().get(self.next_shard) else {
                self.done = true;
                return None;
            };
            self.next_shard += 1;

            match stream.open_shard(url) {
                Ok(records) => self.current = Some(records),
                Err(e) => return self.fail(e),
            }
        }
    }
}

/// Rows yielded by [`ResultStream::iter`].
pub struct Rows<'a> {
    raw: RawRows<'a>,
}

impl Iterator for Rows<'_> {
    type Item = QueueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.raw.next()? {
            Ok(raw) => raw,
            Err(e) => return Some(Err(e)),
        };

        if !self.raw.stream.enable_cast {
            return Some(Ok(raw.into_iter().map(Value::Text).collect()));
        }

        let cast = self
            .raw
            .stream
            .fetch_manifest(false)
            .and_then(|manifest| cast_row(&raw, &manifest));
        if cast.is_err() {
            self.raw.done = true;
            self.raw.current = None;
        }
        Some(cast)
    }
}
