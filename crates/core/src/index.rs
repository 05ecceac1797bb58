use crate::error::PipelineError;
use std::io::Write;

const MAGIC: &[u8; 4] = b"DAIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

/// One nearest-neighbour slot: `position` is the insertion row, which is also
/// the row of the chunk record it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Exhaustive inner-product index over unit-length vectors, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimensions: usize,
    values: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimensions: usize) -> Result<Self, PipelineError> {
        if dimensions == 0 {
            return Err(PipelineError::Configuration(
                "index dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            values: Vec::new(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.values.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<usize, PipelineError> {
        self.check_dimensions(vector.len())?;
        self.values.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.values.get(start..start + self.dimensions)
    }

    /// Returns at most `k` rows by descending inner product. Equal scores keep
    /// insertion order, so results are reproducible for an unchanged index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, PipelineError> {
        self.check_dimensions(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .values
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                score: dot(row, query),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), PipelineError> {
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimensions as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.values {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Parses a file written by [`FlatIpIndex::write_to`]. The header's row
    /// and dimension counts must account for every byte that follows.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupt(format!("{} bytes is shorter than the header", bytes.len())));
        }
        if &bytes[..4] != MAGIC {
            return Err(corrupt("unknown file format".to_string()));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("format version {version} is not supported")));
        }

        let dimensions = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut rows = [0u8; 8];
        rows.copy_from_slice(&bytes[12..HEADER_LEN]);
        let rows = u64::from_le_bytes(rows);

        let expected = usize::try_from(rows)
            .ok()
            .and_then(|rows| rows.checked_mul(dimensions))
            .and_then(|values| values.checked_mul(4))
            .and_then(|body| body.checked_add(HEADER_LEN));
        if expected != Some(bytes.len()) {
            return Err(corrupt(format!(
                "header declares {rows} rows of {dimensions} dimensions but the file has {} bytes",
                bytes.len()
            )));
        }

        let mut index = Self::new(dimensions)?;
        index.values = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|value| f32::from_le_bytes([value[0], value[1], value[2], value[3]]))
            .collect();
        Ok(index)
    }

    fn check_dimensions(&self, got: usize) -> Result<(), PipelineError> {
        if got != self.dimensions {
            return Err(PipelineError::Configuration(format!(
                "vector has {got} dimensions, index expects {}",
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

fn corrupt(details: String) -> PipelineError {
    PipelineError::Configuration(format!("vector index file is corrupt: {details}"))
}
