use std::{
    fs,
    io::{BufWriter, Seek, Write},
    mem::ManuallyDrop,
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder as _, LittleEndian};
use las::{laz::is_laszip_vlr, Builder, Header, Reader, Vlr, Writer};
use pcd_core::{
    classes::ClassMapping,
    features::FeatureMatrix,
    probability::{argmax, entropy, softmax_in_place},
    ClassIndex, Position,
};
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::{
    channels::{ChannelSpec, ChannelType, PREDICTED_CLASSIFICATION, PROBABILITY_ENTROPY},
    extra_bytes::{is_extra_bytes_vlr, ExtraBytesDescriptor, ExtraBytesLayout, NAME_LEN},
    AugmentError,
};

/// Opens full-resolution tiles, writes prediction channels into them and
/// persists the result.
#[derive(Debug, Clone)]
pub struct LasAugmenter {
    classes: ClassMapping,
    probability_channels: Vec<(String, ClassIndex)>,
}

/// Byte offsets of the managed channels inside each point's extra bytes.
#[derive(Debug, Clone)]
struct ChannelOffsets {
    predicted: usize,
    entropy: usize,
    probabilities: Vec<(ClassIndex, usize)>,
}

/// A tile loaded for update. Consumed by [`LasAugmenter::persist`].
#[derive(Debug)]
pub struct AugmentedTile {
    source: PathBuf,
    header: Header,
    points: Vec<las::Point>,
    positions: Vec<Position>,
    layout: ExtraBytesLayout,
    offsets: ChannelOffsets,
    filled: bool,
}

impl AugmentedTile {
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Native point positions, in file order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn layout(&self) -> &ExtraBytesLayout {
        &self.layout
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }
}

fn resolve_channel(
    layout: &mut ExtraBytesLayout,
    spec: &ChannelSpec,
) -> Result<usize, AugmentError> {
    if let Some((offset, existing)) = layout.find(&spec.name)? {
        let expected = spec.channel_type.data_type();
        if existing.data_type() != expected {
            return Err(AugmentError::UnsupportedAttributeType {
                name: spec.name.clone(),
                expected,
                found: existing.data_type(),
            });
        }
        return Ok(offset);
    }
    layout.push(ExtraBytesDescriptor::new(
        &spec.name,
        spec.channel_type,
        spec.description,
    ))
}

fn check_channel_name(name: &str) -> Result<(), AugmentError> {
    if name.is_empty() || name.len() > NAME_LEN {
        return Err(AugmentError::ChannelNameTooLong(name.to_string()));
    }
    if name == PREDICTED_CLASSIFICATION || name == PROBABILITY_ENTROPY {
        return Err(AugmentError::ReservedChannelName(name.to_string()));
    }
    Ok(())
}

/// Streams `points` into `sink` and returns the sink once the header has been
/// rewritten. A writer that fails before closing is leaked: dropping an
/// unclosed `las::Writer` panics.
fn write_points<W>(sink: W, header: Header, points: Vec<las::Point>) -> Result<W, las::Error>
where
    W: 'static + Write + Seek + Send + Sync,
{
    let mut writer = ManuallyDrop::new(Writer::new(sink, header)?);
    let written = points
        .into_iter()
        .try_for_each(|point| writer.write_point(point))
        .and_then(|()| writer.close());
    match written {
        Ok(()) => ManuallyDrop::into_inner(writer).into_inner(),
        Err(err) => Err(err),
    }
}

fn is_laz(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("laz"))
        .unwrap_or(false)
}

impl LasAugmenter {
    pub fn new(classes: ClassMapping, probability_names: &[String]) -> Result<Self, AugmentError> {
        let mut probability_channels = Vec::with_capacity(probability_names.len());
        for name in probability_names {
            check_channel_name(name)?;
            let index = classes.index_of_name(name)?;
            probability_channels.push((name.clone(), index));
        }
        Ok(Self {
            classes,
            probability_channels,
        })
    }

    pub fn classes(&self) -> &ClassMapping {
        &self.classes
    }

    fn channel_specs(&self) -> Vec<ChannelSpec> {
        let mut specs = vec![
            ChannelSpec::new(
                PREDICTED_CLASSIFICATION,
                ChannelType::Int64,
                "predicted class code",
            ),
            ChannelSpec::new(
                PROBABILITY_ENTROPY,
                ChannelType::Float64,
                "predictive entropy (nats)",
            ),
        ];
        for (name, _) in &self.probability_channels {
            specs.push(ChannelSpec::new(
                name,
                ChannelType::Float64,
                "softmax probability",
            ));
        }
        specs
    }

    /// Loads a tile and makes room for the prediction channels, all zeroed.
    pub fn open_for_update(&self, path: &Path) -> Result<AugmentedTile, AugmentError> {
        let missing = |source| AugmentError::MissingFile {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = Reader::from_path(path).map_err(missing)?;
        let header = reader.header().clone();
        let points = reader
            .points()
            .collect::<Result<Vec<_>, _>>()
            .map_err(missing)?;
        log::info!("loaded {} points from {:?}", points.len(), path);

        let mut layout = ExtraBytesLayout::from_vlrs(header.vlrs().iter().chain(header.evlrs()))?;
        layout.pad_to(header.point_format().extra_bytes as usize)?;

        let specs = self.channel_specs();
        let mut resolved = Vec::with_capacity(specs.len());
        for spec in &specs {
            resolved.push((resolve_channel(&mut layout, spec)?, spec.channel_type.size()));
        }
        let record_len = layout.record_len()?;
        if record_len > u16::MAX as usize {
            return Err(AugmentError::MalformedExtraBytes(format!(
                "{} extra bytes per point exceed the format limit",
                record_len
            )));
        }

        let mut points = points;
        points.par_iter_mut().for_each(|point| {
            point.extra_bytes.resize(record_len, 0);
            for &(offset, size) in &resolved {
                point.extra_bytes[offset..offset + size].fill(0);
            }
        });
        let positions = points.iter().map(|p| [p.x, p.y, p.z]).collect();

        let offsets = ChannelOffsets {
            predicted: resolved[0].0,
            entropy: resolved[1].0,
            probabilities: self
                .probability_channels
                .iter()
                .zip(&resolved[2..])
                .map(|((_, class_index), &(offset, _))| (*class_index, offset))
                .collect(),
        };

        Ok(AugmentedTile {
            source: path.to_path_buf(),
            header,
            points,
            positions,
            layout,
            offsets,
            filled: false,
        })
    }

    /// Writes probabilities, predicted codes and entropy from logits aligned
    /// with the tile's native point order.
    pub fn fill(&self, tile: &mut AugmentedTile, logits: &FeatureMatrix) -> Result<(), AugmentError> {
        if logits.rows() != tile.points.len() {
            return Err(AugmentError::DimensionMismatch {
                context: "interpolated logit rows",
                expected: tile.points.len(),
                found: logits.rows(),
            });
        }
        if !tile.points.is_empty() && logits.width() != self.classes.len() {
            return Err(AugmentError::DimensionMismatch {
                context: "logit width",
                expected: self.classes.len(),
                found: logits.width(),
            });
        }

        let offsets = &tile.offsets;
        let classes = &self.classes;
        let width = logits.width().max(1);
        tile.points
            .par_iter_mut()
            .zip(logits.as_slice().par_chunks(width))
            .for_each_init(
                || Vec::with_capacity(width),
                |probabilities, (point, row)| {
                    probabilities.clear();
                    probabilities.extend_from_slice(row);
                    softmax_in_place(probabilities);

                    let bytes = &mut point.extra_bytes;
                    for &(class_index, offset) in &offsets.probabilities {
                        LittleEndian::write_f64(
                            &mut bytes[offset..offset + 8],
                            probabilities[class_index as usize] as f64,
                        );
                    }

                    let code = argmax(probabilities)
                        .and_then(|index| classes.code_of(index))
                        .unwrap_or_default();
                    LittleEndian::write_i64(
                        &mut bytes[offsets.predicted..offsets.predicted + 8],
                        code as i64,
                    );
                    LittleEndian::write_f64(
                        &mut bytes[offsets.entropy..offsets.entropy + 8],
                        entropy(probabilities),
                    );
                },
            );

        tile.filled = true;
        Ok(())
    }

    fn output_header(tile: &AugmentedTile, output_path: &Path) -> Result<Header, AugmentError> {
        let source = &tile.header;
        let record_len = tile.layout.record_len()?;

        let keep = |vlr: &&Vlr| !is_extra_bytes_vlr(vlr) && !is_laszip_vlr(vlr);
        let mut vlrs: Vec<Vlr> = source.vlrs().iter().filter(keep).cloned().collect();
        vlrs.push(tile.layout.to_vlr());

        // keeps guid, date, crs and return-number flags of the source
        let mut builder = Builder::from(source.clone());
        builder.point_format.extra_bytes = record_len as u16;
        builder.point_format.is_compressed = is_laz(output_path);
        builder.vlrs = vlrs;
        builder.evlrs = source.evlrs().iter().filter(keep).cloned().collect();
        builder.point_padding.clear();

        builder
            .into_header()
            .map_err(|e| AugmentError::write_failure(output_path, e))
    }

    /// Writes the tile to `output_path`. The file appears only once it is
    /// complete: points go to a temporary file in the same directory that is
    /// renamed into place.
    pub fn persist(&self, tile: AugmentedTile, output_path: &Path) -> Result<PathBuf, AugmentError> {
        if !tile.filled {
            log::warn!(
                "persisting {:?} without predictions, channels stay zeroed",
                tile.source
            );
        }
        let fail = |e: Box<dyn std::error::Error + Send + Sync>| {
            AugmentError::write_failure(output_path, e)
        };

        let dir = match output_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| fail(e.into()))?;

        let header = Self::output_header(&tile, output_path)?;
        let temp = NamedTempFile::new_in(&dir).map_err(|e| fail(e.into()))?;
        let file = temp.reopen().map_err(|e| fail(e.into()))?;
        // set after reopening so a read-only source still gets written
        if let Ok(metadata) = fs::metadata(&tile.source) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| fail(e.into()))?;
        }

        log::info!("Updated point cloud will be saved to {:?}", output_path);
        let mut inner =
            write_points(BufWriter::new(file), header, tile.points).map_err(|e| fail(e.into()))?;
        inner.flush().map_err(|e| fail(e.into()))?;
        drop(inner);

        temp.persist(output_path).map_err(|e| fail(e.error.into()))?;
        log::info!("Saved {:?}", output_path);
        Ok(output_path.to_path_buf())
    }
}
