use serde_json::Value;

/// A finite stream of `(source_name, document)` pairs feeding
/// [`crate::store::GtsStore::load`]. The store drains the stream exactly once;
/// decoding bytes into documents is the reader's business.
pub trait GtsReader {
    fn documents(&mut self) -> Box<dyn Iterator<Item = (String, Value)> + '_>;
}

/// In-memory reader, mostly for tests and embedding.
impl GtsReader for Vec<(String, Value)> {
    fn documents(&mut self) -> Box<dyn Iterator<Item = (String, Value)> + '_> {
        Box::new(self.drain(..))
    }
}
