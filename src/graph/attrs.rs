//! Attribute scopes
//!
//! Devices, their debug area and channels each own an [`AttrScope`]: the
//! ordered attribute list of that scope plus the handle used to reach the
//! backend. Values are never cached; every access is a backend round trip.

use crate::attr::codec::{decode_named, AttrBlock, BlockDecoder, BlockEncoder};
use crate::attr::{trim_value, AttrTarget, AttrValue};
use crate::backend::description::AttrDescription;
use crate::backend::Backend;
use crate::error::{IioError, Result, ResultExt};
use std::collections::HashSet;
use std::sync::Arc;

/// One declared attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrEntry {
    /// Canonical name
    pub name: String,
    /// Name used on the wire; equals `name` unless the backend says otherwise
    pub filename: String,
}

/// Ordered attributes of one scope
#[derive(Clone)]
pub struct AttrScope {
    target: AttrTarget,
    entries: Vec<AttrEntry>,
    backend: Arc<dyn Backend>,
    max_batch_bytes: usize,
}

impl std::fmt::Debug for AttrScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttrScope")
            .field("target", &self.target)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl AttrScope {
    pub(crate) fn new(
        target: AttrTarget,
        attrs: &[AttrDescription],
        backend: Arc<dyn Backend>,
        max_batch_bytes: usize,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(attrs.len());
        for attr in attrs {
            if !seen.insert(attr.name.as_str()) {
                return Err(IioError::InvalidArgument(format!(
                    "duplicate attribute '{}' in {}",
                    attr.name, target
                )));
            }
            entries.push(AttrEntry {
                name: attr.name.clone(),
                filename: attr.wire_name().to_string(),
            });
        }
        Ok(Self {
            target,
            entries,
            backend,
            max_batch_bytes,
        })
    }

    /// Scope these attributes belong to
    pub fn target(&self) -> &AttrTarget {
        &self.target
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope has no attributes
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared entries in order
    pub fn entries(&self) -> &[AttrEntry] {
        &self.entries
    }

    /// Name of the attribute at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    /// Attribute names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Exact lookup by name
    pub fn find(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|e| e.name.as_str())
    }

    /// Wire filename of an attribute
    pub fn filename(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|e| e.filename.as_str())
    }

    /// Canonical name of the attribute stored under `filename`
    pub fn name_for_filename(&self, filename: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.filename == filename)
            .map(|e| e.name.as_str())
    }

    fn entry(&self, name: &str) -> Option<&AttrEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn wire_name(&self, name: &str) -> Result<&str> {
        self.filename(name).ok_or_else(|| {
            IioError::NotFound(format!("attribute '{}' of {}", name, self.target))
        })
    }

    /// Read the raw bytes of one attribute
    pub fn read_raw(&self, name: &str) -> Result<Vec<u8>> {
        let filename = self.wire_name(name)?;
        self.backend
            .read_attr(&self.target, filename)
            .with_context(|| format!("Failed to read '{}' of {}", name, self.target))
    }

    /// Read one attribute as text, without trailing terminators
    pub fn read_string(&self, name: &str) -> Result<String> {
        self.read_raw(name).map(|raw| trim_value(&raw))
    }

    /// Read and parse one attribute
    pub fn read<T: AttrValue>(&self, name: &str) -> Result<T> {
        let text = self.read_string(name)?;
        T::parse_attr(name, &text)
    }

    /// Write raw bytes to one attribute
    pub fn write_raw(&self, name: &str, value: &[u8]) -> Result<usize> {
        let filename = self.wire_name(name)?;
        self.backend
            .write_attr(&self.target, filename, value)
            .with_context(|| format!("Failed to write '{}' of {}", name, self.target))
    }

    /// Write text to one attribute
    pub fn write_string(&self, name: &str, value: &str) -> Result<usize> {
        self.write_raw(name, value.as_bytes())
    }

    /// Format and write one attribute
    pub fn write<T: AttrValue>(&self, name: &str, value: &T) -> Result<usize> {
        self.write_string(name, &value.format_attr())
    }

    /// Read every attribute of the scope in one exchange
    pub fn read_all(&self) -> Result<AttrBatch> {
        let filenames: Vec<String> = self.entries.iter().map(|e| e.filename.clone()).collect();
        let data = self
            .backend
            .read_attrs(&self.target, &filenames)
            .with_context(|| format!("Failed to read attributes of {}", self.target))?;

        // Framing errors surface lazily; oversize blocks are refused up front
        for block in BlockDecoder::new(&data) {
            match block {
                Ok(AttrBlock::Data(payload)) if payload.len() > self.max_batch_bytes => {
                    return Err(IioError::Io(format!(
                        "attribute block of {} bytes from {} exceeds the {} byte limit",
                        payload.len(),
                        self.target,
                        self.max_batch_bytes
                    )));
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }

        tracing::debug!("Read {} attributes of {} in one exchange", self.len(), self.target);
        Ok(AttrBatch {
            names: self.entries.iter().map(|e| e.name.clone()).collect(),
            data,
        })
    }

    /// Write the scope in one exchange
    ///
    /// `producer` is called once per attribute in declaration order; an
    /// `Err` skips that attribute. Returns the number of attributes sent.
    pub fn write_all<F>(&self, mut producer: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        let mut encoder = BlockEncoder::new();
        let mut written = 0;
        for entry in &self.entries {
            match producer(&entry.name) {
                Ok(value) => {
                    encoder
                        .push_data(&value)
                        .with_context(|| format!("Failed to encode '{}'", entry.name))?;
                    written += 1;
                }
                Err(e) => encoder.push_error(e.errno()),
            }
        }

        let filenames: Vec<String> = self.entries.iter().map(|e| e.filename.clone()).collect();
        self.backend
            .write_attrs(&self.target, &filenames, &encoder.finish())
            .with_context(|| format!("Failed to write attributes of {}", self.target))?;
        Ok(written)
    }
}

/// Result of a whole-scope read
///
/// Holds the raw exchange; [`AttrBatch::iter`] decodes it lazily against the
/// scope's attribute names. A failed attribute does not affect its siblings.
#[derive(Debug, Clone)]
pub struct AttrBatch {
    names: Vec<String>,
    data: Vec<u8>,
}

impl AttrBatch {
    /// Number of attributes in the exchange
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the exchange covered no attributes
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Raw block stream as received
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Decode `(name, value-or-error)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Result<&[u8]>)> + '_ {
        decode_named(self.names.iter().map(String::as_str), &self.data)
    }

    /// Decode into owned text values
    pub fn to_strings(&self) -> Vec<(String, Result<String>)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.map(trim_value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextDescription, SimulatedBackend};

    fn scope(backend: Arc<dyn Backend>, limit: usize) -> AttrScope {
        AttrScope::new(
            AttrTarget::Device("dev".into()),
            &[
                AttrDescription::new("a").with_value("1"),
                AttrDescription::new("b"),
                AttrDescription::new("c").with_value(""),
            ],
            backend,
            limit,
        )
        .unwrap()
    }

    fn simulated() -> Arc<SimulatedBackend> {
        use crate::backend::DeviceDescription;
        Arc::new(SimulatedBackend::new(
            ContextDescription::new("sim").with_device(
                DeviceDescription::new("dev")
                    .with_attr(AttrDescription::new("a").with_value("1"))
                    .with_attr(AttrDescription::new("b"))
                    .with_attr(AttrDescription::new("c").with_value("")),
            ),
        ))
    }

    #[test]
    fn test_read_all_isolates_failures() {
        let sim = simulated();
        let scope = scope(sim.clone(), 1024);
        let batch = scope.read_all().unwrap();
        assert_eq!(
            batch.raw(),
            &[0, 0, 0, 1, b'1', 0xFF, 0xFF, 0xFF, 0xFE, 0, 0, 0, 0][..]
        );

        let items: Vec<_> = batch.iter().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].0, "a");
        assert_eq!(*items[0].1.as_ref().unwrap(), b"1");
        assert!(items[1].1.as_ref().unwrap_err().is_not_found());
        assert!(items[2].1.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_read_all_rejects_oversize_blocks() {
        let sim = simulated();
        sim.write_attr(&AttrTarget::Device("dev".into()), "c", &[b'x'; 64])
            .unwrap();
        let err = scope(sim, 16).read_all().unwrap_err();
        assert!(matches!(err, IioError::Io(_)));
    }

    #[test]
    fn test_write_all_skips_failed_producers() {
        let sim = simulated();
        let scope = scope(sim.clone(), 1024);
        let written = scope
            .write_all(|name| match name {
                "b" => Err(IioError::InvalidArgument("skip".into())),
                other => Ok(format!("{}-new", other).into_bytes()),
            })
            .unwrap();
        assert_eq!(written, 2);

        let target = AttrTarget::Device("dev".into());
        assert_eq!(sim.attr_value(&target, "a").unwrap(), b"a-new");
        assert_eq!(sim.attr_value(&target, "b"), None);
        assert_eq!(sim.attr_value(&target, "c").unwrap(), b"c-new");
    }

    #[test]
    fn test_unknown_attribute_is_not_found_without_io() {
        let sim = simulated();
        let scope = scope(sim.clone(), 1024);
        assert!(scope.read_raw("zzz").unwrap_err().is_not_found());
        assert_eq!(sim.stats().successful_ops + sim.stats().failed_ops, 0);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = AttrScope::new(
            AttrTarget::Device("dev".into()),
            &[AttrDescription::new("a"), AttrDescription::new("a")],
            simulated(),
            1024,
        )
        .unwrap_err();
        assert!(matches!(err, IioError::InvalidArgument(_)));
    }

    #[test]
    fn test_typed_access() {
        let sim = simulated();
        let scope = scope(sim.clone(), 1024);
        assert_eq!(scope.read::<i64>("a").unwrap(), 1);
        assert!(scope.read::<bool>("a").unwrap());
        scope.write("b", &2.5f64).unwrap();
        assert_eq!(scope.read::<f64>("b").unwrap(), 2.5);
        scope.write("b", &false).unwrap();
        assert_eq!(scope.read_string("b").unwrap(), "0");
    }
}
