//! Lazily evaluated, row-chunked distributed arrays.
//!
//! A [`DArray`] is split along its first axis into blocks. Each block is
//! either a pending task that produces the block when run, or a resident
//! block already materialized on a worker. Nothing is computed until the
//! array is persisted or gathered through a [`Client`](crate::cluster::Client).

mod random;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use ndarray::{Array, Axis, Dimension, Ix1, Ix2, RemoveAxis, Slice};

use crate::cluster::WorkerId;
use crate::error::{Error, Result};

pub use random::{random_1d, random_2d};

/// Row-chunked 2-D array (`rows x features`).
pub type DArray2 = DArray<Ix2>;

/// Row-chunked 1-D array.
pub type DArray1 = DArray<Ix1>;

type BlockFn<D> = dyn Fn() -> Result<Array<f32, D>> + Send + Sync;

// =============================================================================
// Block
// =============================================================================

/// Deferred computation producing one block.
pub struct BlockTask<D: Dimension> {
    run: Arc<BlockFn<D>>,
    affinity: Option<WorkerId>,
}

impl<D: Dimension> BlockTask<D> {
    /// Task with no worker preference.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<Array<f32, D>> + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(f),
            affinity: None,
        }
    }

    /// Pin the task to a worker.
    pub fn on_worker(mut self, worker: WorkerId) -> Self {
        self.affinity = Some(worker);
        self
    }
}

impl<D: Dimension> Clone for BlockTask<D> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            affinity: self.affinity,
        }
    }
}

/// One row-chunk of a [`DArray`].
pub enum Block<D: Dimension> {
    /// Not yet computed.
    Pending(BlockTask<D>),
    /// Materialized on a worker.
    Resident {
        worker: WorkerId,
        data: Arc<Array<f32, D>>,
    },
}

impl<D: Dimension> Block<D> {
    /// Worker this block lives on or prefers to run on.
    #[inline]
    pub fn affinity(&self) -> Option<WorkerId> {
        match self {
            Block::Pending(task) => task.affinity,
            Block::Resident { worker, .. } => Some(*worker),
        }
    }

    /// Whether the block has been materialized.
    #[inline]
    pub fn is_resident(&self) -> bool {
        matches!(self, Block::Resident { .. })
    }

    /// The block's values, running the task if needed.
    pub fn materialize(&self) -> Result<Arc<Array<f32, D>>> {
        match self {
            Block::Pending(task) => Ok(Arc::new((task.run)()?)),
            Block::Resident { data, .. } => Ok(Arc::clone(data)),
        }
    }
}

impl<D: Dimension> Clone for Block<D> {
    fn clone(&self) -> Self {
        match self {
            Block::Pending(task) => Block::Pending(task.clone()),
            Block::Resident { worker, data } => Block::Resident {
                worker: *worker,
                data: Arc::clone(data),
            },
        }
    }
}

impl<D: Dimension> fmt::Debug for Block<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Pending(task) => f
                .debug_struct("Pending")
                .field("affinity", &task.affinity)
                .finish(),
            Block::Resident { worker, data } => f
                .debug_struct("Resident")
                .field("worker", worker)
                .field("shape", &data.shape())
                .finish(),
        }
    }
}

// =============================================================================
// DArray
// =============================================================================

/// Distributed array chunked along axis 0.
///
/// `chunks[i]` is the row count of block `i`. All blocks share every other
/// dimension with the array.
#[derive(Debug, Clone)]
pub struct DArray<D: Dimension> {
    name: String,
    dim: D,
    chunks: Vec<usize>,
    blocks: Vec<Block<D>>,
}

impl<D: Dimension> DArray<D> {
    /// Assemble an array from its parts.
    ///
    /// `chunks` must sum to `dim[0]` and have one entry per block.
    pub fn from_blocks(
        name: impl Into<String>,
        dim: D,
        chunks: Vec<usize>,
        blocks: Vec<Block<D>>,
    ) -> Result<Self> {
        let name = name.into();
        let n_rows = dim.slice().first().copied().unwrap_or(0);
        if chunks.len() != blocks.len() || chunks.iter().sum::<usize>() != n_rows {
            return Err(Error::Misaligned {
                left: name.clone(),
                right: name,
                reason: format!(
                    "{} chunks summing to {} for {} blocks and {} rows",
                    chunks.len(),
                    chunks.iter().sum::<usize>(),
                    blocks.len(),
                    n_rows
                ),
            });
        }
        Ok(Self {
            name,
            dim,
            chunks,
            blocks,
        })
    }

    /// Unique name identifying this array's contents.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full shape.
    pub fn shape(&self) -> &[usize] {
        self.dim.slice()
    }

    pub(crate) fn raw_dim(&self) -> D {
        self.dim.clone()
    }

    /// Number of rows (length of axis 0).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Rows per block.
    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    /// Row range of block `i`.
    pub fn chunk_bounds(&self, i: usize) -> Range<usize> {
        let start: usize = self.chunks[..i].iter().sum();
        start..start + self.chunks[i]
    }

    #[inline]
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block<D>] {
        &self.blocks
    }

    /// Whether every block is resident on a worker.
    pub fn is_persisted(&self) -> bool {
        self.blocks.iter().all(Block::is_resident)
    }

    /// Same array with different blocks (same name, shape and chunks).
    pub(crate) fn with_blocks(&self, blocks: Vec<Block<D>>) -> Self {
        debug_assert_eq!(blocks.len(), self.blocks.len());
        Self {
            name: self.name.clone(),
            dim: self.dim.clone(),
            chunks: self.chunks.clone(),
            blocks,
        }
    }

    /// Whether both arrays have identical row chunking.
    pub fn aligned_with<E: Dimension>(&self, other: &DArray<E>) -> bool {
        self.chunks == other.chunks
    }

    /// Error unless both arrays have identical row chunking.
    pub fn ensure_aligned<E: Dimension>(&self, other: &DArray<E>) -> Result<()> {
        if self.aligned_with(other) {
            return Ok(());
        }
        let reason = if self.n_rows() != other.n_rows() {
            format!("{} rows vs {} rows", self.n_rows(), other.n_rows())
        } else {
            format!("{} blocks vs {} blocks with different chunk sizes", self.n_blocks(), other.n_blocks())
        };
        Err(Error::Misaligned {
            left: self.name.clone(),
            right: other.name.clone(),
            reason,
        })
    }

    /// Lazily apply `f` to every block.
    ///
    /// `out_dim` is the shape of the result; its first axis must equal this
    /// array's row count and `f` must return blocks with the same row count as
    /// its input. Output blocks keep the input's worker affinity, so a
    /// persisted input yields an output that runs where the data lives.
    pub fn map_blocks<E, F>(&self, op: &str, out_dim: E, f: F) -> Result<DArray<E>>
    where
        D: 'static,
        E: Dimension + 'static,
        F: Fn(&Array<f32, D>) -> Result<Array<f32, E>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let blocks = self
            .blocks
            .iter()
            .map(|block| {
                let source = block.clone();
                let f = Arc::clone(&f);
                let task = BlockTask::new(move || f(&*source.materialize()?));
                match block.affinity() {
                    Some(worker) => Block::Pending(task.on_worker(worker)),
                    None => Block::Pending(task),
                }
            })
            .collect();

        DArray::from_blocks(tokenize(op), out_dim, self.chunks.clone(), blocks)
    }
}

impl<D: Dimension + RemoveAxis + 'static> DArray<D> {
    /// Wrap an in-memory array, splitting it into blocks of `chunk` rows.
    ///
    /// Blocks are pending slices of the shared source; they are copied onto a
    /// worker when the array is persisted.
    pub fn from_array(array: Array<f32, D>, chunk: usize) -> Result<Self> {
        let n_rows = array.len_of(Axis(0));
        let chunks = normalize_chunks(n_rows, chunk)?;
        let dim = array.raw_dim();
        let source = Arc::new(array);

        let mut start = 0;
        let blocks = chunks
            .iter()
            .map(|&len| {
                let source = Arc::clone(&source);
                let range = start..start + len;
                start += len;
                Block::Pending(BlockTask::new(move || {
                    Ok(source
                        .slice_axis(Axis(0), Slice::from(range.clone()))
                        .to_owned())
                }))
            })
            .collect();

        DArray::from_blocks(tokenize("array"), dim, chunks, blocks)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Unique name for a new array produced by `op`.
pub(crate) fn tokenize(op: &str) -> String {
    format!("{op}-{:016x}", rand::random::<u64>())
}

/// Split `len` rows into blocks of `chunk` rows; the last block may be short.
pub fn normalize_chunks(len: usize, chunk: usize) -> Result<Vec<usize>> {
    if chunk == 0 {
        return Err(Error::InvalidChunkSize(chunk));
    }
    let mut chunks = vec![chunk; len / chunk];
    if len % chunk != 0 {
        chunks.push(len % chunk);
    }
    Ok(chunks)
}
