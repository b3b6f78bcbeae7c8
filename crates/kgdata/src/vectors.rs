//! Parquet storage for trained item vectors.
//!
//! Schema: `item_id: UInt32`, `token: Utf8`, `vector: List<Float32>`.
//! Used to hand the final item representation to a serving index.

use std::path::Path;
use std::sync::Arc;

use arrow::array::*;
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

/// Item vectors keyed by item id and token.
#[derive(Debug, Clone, Default)]
pub struct ItemVectors {
    ids: Vec<u32>,
    tokens: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl ItemVectors {
    /// Create an empty set of vectors with the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    /// Append one item vector. Fails on a dimension mismatch.
    pub fn push(&mut self, id: u32, token: impl Into<String>, vector: Vec<f32>) -> anyhow::Result<()> {
        if vector.len() != self.dim {
            anyhow::bail!(
                "item vector dimension mismatch: expected {}, got {} for item {id}",
                self.dim,
                vector.len()
            );
        }
        self.ids.push(id);
        self.tokens.push(token.into());
        self.vectors.push(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Iterate `(id, token, vector)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str, &[f32])> {
        self.ids
            .iter()
            .zip(&self.tokens)
            .zip(&self.vectors)
            .map(|((&id, token), v)| (id, token.as_str(), v.as_slice()))
    }

    /// Look up the vector of an item id.
    pub fn get(&self, id: u32) -> Option<&[f32]> {
        self.ids
            .iter()
            .position(|&i| i == id)
            .map(|pos| self.vectors[pos].as_slice())
    }

    /// Write all vectors to a Parquet file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let schema = Arc::new(item_vector_schema());

        let mut all_values = Vec::with_capacity(self.len() * self.dim);
        let mut offsets = vec![0i32];
        for v in &self.vectors {
            all_values.extend_from_slice(v);
            offsets.push(all_values.len() as i32);
        }

        let id_array = UInt32Array::from(self.ids.clone());
        let token_array: StringArray = self.tokens.iter().map(|s| Some(s.as_str())).collect();
        let list_array = ListArray::new(
            Arc::new(Field::new("item", DataType::Float32, false)),
            OffsetBuffer::new(offsets.into()),
            Arc::new(Float32Array::from(all_values)),
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(id_array), Arc::new(token_array), Arc::new(list_array)],
        )?;

        let file = std::fs::File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            items = self.len(),
            dim = self.dim,
            path = %path.display(),
            "Wrote item vectors to Parquet"
        );

        Ok(())
    }

    /// Read vectors from a Parquet file written by [`ItemVectors::save`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut out: Option<Self> = None;
        for batch_result in reader {
            let batch = batch_result?;

            let ids = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .ok_or_else(|| anyhow::anyhow!("Column 0 is not UInt32Array"))?;
            let tokens = batch
                .column(1)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow::anyhow!("Column 1 is not StringArray"))?;
            let lists = batch
                .column(2)
                .as_any()
                .downcast_ref::<ListArray>()
                .ok_or_else(|| anyhow::anyhow!("Column 2 is not ListArray"))?;

            for i in 0..batch.num_rows() {
                let values = lists.value(i);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("List values are not Float32Array"))?;
                let vector = floats.values().to_vec();
                let vectors = out.get_or_insert_with(|| Self::new(vector.len()));
                vectors.push(ids.value(i), tokens.value(i), vector)?;
            }
        }

        let vectors = out.unwrap_or_default();
        tracing::info!(
            items = vectors.len(),
            dim = vectors.dim,
            path = %path.display(),
            "Loaded item vectors from Parquet"
        );
        Ok(vectors)
    }
}

/// Arrow schema for item-vector Parquet files.
pub fn item_vector_schema() -> Schema {
    Schema::new(vec![
        Field::new("item_id", DataType::UInt32, false),
        Field::new("token", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::List(Arc::new(Field::new("item", DataType::Float32, false))),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_push_dimension_check() {
        let mut vectors = ItemVectors::new(3);
        vectors.push(1, "i1", vec![0.1, 0.2, 0.3]).unwrap();
        assert!(vectors.push(2, "i2", vec![0.1, 0.2]).is_err());
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors.get(1), Some(&[0.1_f32, 0.2, 0.3][..]));
        assert!(vectors.get(2).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("items.parquet");

        let mut vectors = ItemVectors::new(2);
        vectors.push(1, "movie_a", vec![1.0, -1.0]).unwrap();
        vectors.push(2, "movie_b", vec![0.5, 0.25]).unwrap();
        vectors.save(&path).unwrap();

        let loaded = ItemVectors::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dim(), 2);
        let rows: Vec<(u32, String)> = loaded.iter().map(|(id, t, _)| (id, t.to_string())).collect();
        assert_eq!(rows, vec![(1, "movie_a".to_string()), (2, "movie_b".to_string())]);
        assert_eq!(loaded.get(2).unwrap(), &[0.5, 0.25]);
    }

    #[test]
    fn test_load_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.parquet");
        ItemVectors::new(4).save(&path).unwrap();
        let loaded = ItemVectors::load(&path).unwrap();
        assert!(loaded.is_empty());
    }
}
