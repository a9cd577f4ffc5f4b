use std::sync::{Arc, Mutex};

use im::Vector;

use crate::error::SorrelError;
use crate::guard;
use crate::value::Value;

/// Ordered, non-mutating, possibly lazy view of one or more values.
///
/// A present sequence is never empty: `first` is always defined, and the
/// empty sequence is represented as `None` at the `Option<SeqRef>` level.
/// Both operations are fallible because lazy tails may fail to realize.
pub trait Seq: Send + Sync {
    fn first(&self) -> Result<Value, SorrelError>;
    fn rest(&self) -> Result<Option<SeqRef>, SorrelError>;
}

pub type SeqRef = Arc<dyn Seq>;

impl std::fmt::Debug for dyn Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seq")
    }
}

struct ConsSeq {
    head: Value,
    tail: Option<SeqRef>,
}

impl Seq for ConsSeq {
    fn first(&self) -> Result<Value, SorrelError> {
        Ok(self.head.clone())
    }

    fn rest(&self) -> Result<Option<SeqRef>, SorrelError> {
        Ok(self.tail.clone())
    }
}

/// Index-advancing view over a persistent vector. Invariant: `index` is in
/// bounds, so the view is non-empty.
struct VectorSeq {
    items: Vector<Value>,
    index: usize,
}

impl Seq for VectorSeq {
    fn first(&self) -> Result<Value, SorrelError> {
        self.items
            .get(self.index)
            .cloned()
            .ok_or_else(|| SorrelError::runtime("sequence view out of bounds"))
    }

    fn rest(&self) -> Result<Option<SeqRef>, SorrelError> {
        let next = self.index + 1;
        if next < self.items.len() {
            Ok(Some(Arc::new(VectorSeq {
                items: self.items.clone(),
                index: next,
            })))
        } else {
            Ok(None)
        }
    }
}

/// Engine trait for single-pass element producers.
/// `next` returns the next element, and `Ok(None)` at the end.
pub trait SeqEngine: Send + 'static {
    fn next(&mut self) -> Result<Option<Value>, SorrelError>;
}

struct EngineState {
    engine: Box<dyn SeqEngine>,
}

/// Lazy sequence over a shared one-pass engine. Each node memoizes its tail,
/// so every element is pulled from the engine exactly once and the node chain
/// presents a persistent first/rest face.
struct LazySeq {
    head: Value,
    source: Arc<Mutex<EngineState>>,
    tail: Mutex<Option<Option<SeqRef>>>,
}

impl Seq for LazySeq {
    fn first(&self) -> Result<Value, SorrelError> {
        Ok(self.head.clone())
    }

    fn rest(&self) -> Result<Option<SeqRef>, SorrelError> {
        let mut memo = self
            .tail
            .lock()
            .map_err(|_| SorrelError::runtime("lazy sequence lock poisoned"))?;
        if let Some(tail) = memo.as_ref() {
            return Ok(tail.clone());
        }
        let next = {
            let mut source = self
                .source
                .lock()
                .map_err(|_| SorrelError::runtime("lazy sequence lock poisoned"))?;
            source.engine.next()?
        };
        let tail = next.map(|head| {
            Arc::new(LazySeq {
                head,
                source: self.source.clone(),
                tail: Mutex::new(None),
            }) as SeqRef
        });
        *memo = Some(tail.clone());
        Ok(tail)
    }
}

struct IterEngine<I>
where
    I: Iterator<Item = Value> + Send + 'static,
{
    iter: I,
}

impl<I> SeqEngine for IterEngine<I>
where
    I: Iterator<Item = Value> + Send + 'static,
{
    fn next(&mut self) -> Result<Option<Value>, SorrelError> {
        Ok(self.iter.next())
    }
}

pub fn cons(value: Value, tail: Option<SeqRef>) -> SeqRef {
    Arc::new(ConsSeq { head: value, tail })
}

/// Builds a sequence from an explicit ordered list of values. Empty input
/// yields the absent sequence.
pub fn list(values: &[Value]) -> Option<SeqRef> {
    list_star(values, None)
}

/// Prepends an ordered list of values onto an existing tail sequence.
pub fn list_star(values: &[Value], tail: Option<SeqRef>) -> Option<SeqRef> {
    let mut out = tail;
    for value in values.iter().rev() {
        out = Some(cons(value.clone(), out));
    }
    out
}

pub fn from_vector(items: Vector<Value>) -> Option<SeqRef> {
    if items.is_empty() {
        None
    } else {
        Some(Arc::new(VectorSeq { items, index: 0 }))
    }
}

pub fn from_slice(values: &[Value]) -> Option<SeqRef> {
    from_vector(values.iter().cloned().collect())
}

pub fn from_iter<I>(iter: I) -> Result<Option<SeqRef>, SorrelError>
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: Send + 'static,
{
    seq_from_engine(Box::new(IterEngine {
        iter: iter.into_iter(),
    }))
}

pub fn seq_from_engine(mut engine: Box<dyn SeqEngine>) -> Result<Option<SeqRef>, SorrelError> {
    match engine.next()? {
        None => Ok(None),
        Some(head) => Ok(Some(Arc::new(LazySeq {
            head,
            source: Arc::new(Mutex::new(EngineState { engine })),
            tail: Mutex::new(None),
        }))),
    }
}

/// Sequence view of a value. `Nil` and empty collections are the absent
/// sequence; non-seqable values are a type mismatch.
pub fn seq(value: &Value) -> Result<Option<SeqRef>, SorrelError> {
    match value {
        Value::Nil => Ok(None),
        Value::List(items) | Value::Vector(items) => Ok(from_vector(items.clone())),
        Value::Seq(existing) => Ok(Some(existing.clone())),
        other => Err(SorrelError::type_mismatch("seqable", other.type_name())),
    }
}

/// Counts elements, stopping early once the count passes `limit`. The result
/// saturates at `limit + 1`, the generic "at least limit + 1" signal; `rest`
/// is called at most `limit` times, so the probe never advances past the
/// `limit + 1`th element.
pub fn bounded_length(seq: Option<&SeqRef>, limit: usize) -> Result<usize, SorrelError> {
    let mut count = 0;
    let mut cursor = seq.cloned();
    while let Some(node) = cursor {
        count += 1;
        if count > limit {
            return Ok(count);
        }
        guard::tick()?;
        cursor = node.rest()?;
    }
    Ok(count)
}

/// Full realization into a persistent vector. Guard-ticked: unbounded input
/// fails once the installed traversal budget runs out.
pub fn collect(seq: Option<&SeqRef>) -> Result<Vector<Value>, SorrelError> {
    let mut out = Vector::new();
    let mut cursor = seq.cloned();
    while let Some(node) = cursor {
        guard::tick()?;
        out.push_back(node.first()?);
        cursor = node.rest()?;
    }
    Ok(out)
}
