//! Tag and artwork round-tripping across a rewrite.
//!
//! Re-encoding drops everything that is not audio, so the rewriter takes a
//! [`MetadataBundle`] snapshot before writing and puts it back afterwards.
//! Each container gets its own [`MetadataStore`], chosen once per file by
//! [`store_for`], which knows the tag formats that container carries:
//!
//! - MP3: ID3v2, ID3v1, APE
//! - FLAC: Vorbis comments and picture blocks, stray ID3v2
//! - M4A: `ilst` atoms (artwork in `covr`)
//! - WAV: ID3v2 chunk, RIFF INFO
//!
//! Uses the lofty crate for the actual reading and writing.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::probe::Probe;
use lofty::tag::{ItemValue, Tag, TagExt, TagType};
use tracing::debug;

use crate::audio::AudioFormat;

/// Tag items flattened to `key -> values`, for reporting and comparison.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Metadata errors.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read tags: {0}")]
    Read(#[source] lofty::error::LoftyError),

    #[error("Failed to write {tag_type:?} tag: {source}")]
    Write {
        tag_type: TagType,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("No metadata support for {0} files")]
    Unsupported(AudioFormat),
}

/// Everything non-audio a file carried before a rewrite: every tag the
/// container supports, pictures included.
#[derive(Clone, Default)]
pub struct MetadataBundle {
    tags: Vec<Tag>,
}

// lofty's `Tag` has no Debug impl
impl fmt::Debug for MetadataBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataBundle")
            .field("tag_types", &self.tag_types())
            .field("pictures", &self.picture_count())
            .finish()
    }
}

impl MetadataBundle {
    pub fn is_empty(&self) -> bool {
        self.tags.iter().all(|t| t.is_empty())
    }

    /// Tag formats present in the snapshot.
    pub fn tag_types(&self) -> Vec<TagType> {
        self.tags.iter().map(|t| t.tag_type()).collect()
    }

    /// All text-like items across every tag, keyed by `"<TagType>:<ItemKey>"`.
    pub fn tag_map(&self) -> TagMap {
        let mut map = TagMap::new();
        for tag in &self.tags {
            for item in tag.items() {
                let key = format!("{:?}:{:?}", tag.tag_type(), item.key());
                let value = match item.value() {
                    ItemValue::Text(s) | ItemValue::Locator(s) => s.clone(),
                    ItemValue::Binary(b) => format!("<{} bytes>", b.len()),
                };
                map.entry(key).or_default().push(value);
            }
        }
        map
    }

    /// The front cover, or failing that the first picture in any tag.
    pub fn artwork(&self) -> Option<&[u8]> {
        let pictures = || self.tags.iter().flat_map(|t| t.pictures().iter());
        pictures()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures().next())
            .map(|p| p.data())
    }

    /// Total number of embedded pictures.
    pub fn picture_count(&self) -> usize {
        self.tags.iter().map(|t| t.pictures().len()).sum()
    }
}

/// Per-container metadata access.
pub trait MetadataStore: Send + Sync {
    /// Container this store handles.
    fn format(&self) -> AudioFormat;

    /// Tag formats the container carries, in write order.
    fn tag_types(&self) -> &'static [TagType];

    /// Capture every supported tag, pictures included.
    fn snapshot(&self, path: &Path) -> Result<MetadataBundle, MetadataError> {
        read_bundle(path, &self.format(), self.tag_types())
    }

    /// Flattened tag items.
    fn read_tags(&self, path: &Path) -> Result<TagMap, MetadataError> {
        Ok(self.snapshot(path)?.tag_map())
    }

    /// Embedded artwork bytes, if any.
    fn read_artwork(&self, path: &Path) -> Result<Option<Vec<u8>>, MetadataError> {
        Ok(self.snapshot(path)?.artwork().map(<[u8]>::to_vec))
    }

    /// Write a snapshot back. Tag formats the snapshot did not contain are
    /// stripped, so nothing the encoder added survives.
    fn write_tags_and_artwork(
        &self,
        path: &Path,
        bundle: &MetadataBundle,
    ) -> Result<(), MetadataError> {
        let present = bundle.tag_types();

        for &tag_type in self.tag_types() {
            if present.contains(&tag_type) {
                continue;
            }
            if let Err(e) = Tag::new(tag_type).remove_from_path(path) {
                debug!(target: "metadata", ?tag_type, error = %e, "Nothing to strip");
            }
        }

        for tag in &bundle.tags {
            tag.save_to_path(path, WriteOptions::default())
                .map_err(|source| MetadataError::Write {
                    tag_type: tag.tag_type(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn read_bundle(
    path: &Path,
    format: &AudioFormat,
    tag_types: &[TagType],
) -> Result<MetadataBundle, MetadataError> {
    let tagged_file = Probe::open(path)
        .and_then(|p| p.read())
        .map_err(MetadataError::Read)?;

    let bundle = MetadataBundle {
        tags: tag_types
            .iter()
            .filter_map(|&tt| tagged_file.tag(tt).cloned())
            .collect(),
    };

    debug!(
        target: "metadata",
        path = %path.display(),
        %format,
        tags = ?bundle.tag_types(),
        pictures = bundle.picture_count(),
        "Snapshotted metadata"
    );
    Ok(bundle)
}

/// Move ID3v2 items and pictures into the Vorbis comments. Items the Vorbis
/// comments already have win.
fn fold_id3v2_into_vorbis(tags: Vec<Tag>) -> Vec<Tag> {
    let (id3, mut tags): (Vec<Tag>, Vec<Tag>) = tags
        .into_iter()
        .partition(|t| t.tag_type() == TagType::Id3v2);
    let Some(id3) = id3.into_iter().next() else {
        return tags;
    };

    let idx = match tags.iter().position(|t| t.tag_type() == TagType::VorbisComments) {
        Some(idx) => idx,
        None => {
            tags.push(Tag::new(TagType::VorbisComments));
            tags.len() - 1
        }
    };
    let vorbis = &mut tags[idx];

    for item in id3.items() {
        if vorbis.get(item.key()).is_none() && !vorbis.insert(item.clone()) {
            debug!(target: "metadata", key = ?item.key(), "ID3v2 item has no Vorbis equivalent");
        }
    }
    if vorbis.pictures().is_empty() {
        for picture in id3.pictures() {
            vorbis.push_picture(picture.clone());
        }
    }
    tags
}

/// MP3: ID3v2 first, then the trailing APE and ID3v1 tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Store;

impl MetadataStore for Id3Store {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn tag_types(&self) -> &'static [TagType] {
        &[TagType::Id3v2, TagType::Ape, TagType::Id3v1]
    }
}

/// FLAC: Vorbis comments (pictures travel as FLAC picture blocks), plus
/// the read-only ID3v2 tag some taggers prepend.
#[derive(Debug, Clone, Copy, Default)]
pub struct VorbisStore;

impl MetadataStore for VorbisStore {
    fn format(&self) -> AudioFormat {
        AudioFormat::Flac
    }

    fn tag_types(&self) -> &'static [TagType] {
        &[TagType::VorbisComments, TagType::Id3v2]
    }

    /// FLAC's ID3v2 cannot be written back, so it is carried over as Vorbis
    /// comments.
    fn snapshot(&self, path: &Path) -> Result<MetadataBundle, MetadataError> {
        let mut bundle = read_bundle(path, &self.format(), self.tag_types())?;
        bundle.tags = fold_id3v2_into_vorbis(bundle.tags);
        Ok(bundle)
    }
}

/// M4A/MP4: the `ilst` atom.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Store;

impl MetadataStore for Mp4Store {
    fn format(&self) -> AudioFormat {
        AudioFormat::M4a
    }

    fn tag_types(&self) -> &'static [TagType] {
        &[TagType::Mp4Ilst]
    }
}

/// WAV: an `ID3 ` chunk and/or a RIFF `LIST INFO` chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiffStore;

impl MetadataStore for RiffStore {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn tag_types(&self) -> &'static [TagType] {
        &[TagType::Id3v2, TagType::RiffInfo]
    }
}

/// Store for a container, or `None` for containers we cannot round-trip.
pub fn store_for(format: &AudioFormat) -> Option<&'static dyn MetadataStore> {
    match format {
        AudioFormat::Mp3 => Some(&Id3Store),
        AudioFormat::Flac => Some(&VorbisStore),
        AudioFormat::M4a => Some(&Mp4Store),
        AudioFormat::Wav => Some(&RiffStore),
        AudioFormat::Other(_) => None,
    }
}
