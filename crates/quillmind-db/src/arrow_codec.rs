//! Arrow schema and `DenseEntry` <-> `RecordBatch` conversion for the chunks
//! table. Follows `ferrumyx_db`'s `schema_arrow.rs` idiom: a `*_schema()`
//! function, a `*_to_record()` builder, and a `record_to_*()` extractor using
//! `downcast_ref` closures per column.

use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use quillmind_common::SectionType;

use crate::error::{DbError, Result};
use crate::schema::{DenseEntry, EMBEDDING_DIM};

pub fn chunk_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("paper_id", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int64, false),
        Field::new("content", DataType::Utf8, false),
        // on-disk names kept for bit-compat, see DenseEntry doc comment.
        Field::new("source", DataType::Utf8, false),
        Field::new("section_title", DataType::Utf8, false),
        Field::new("page_range", DataType::Utf8, false),
        Field::new("char_count", DataType::Int64, false),
        Field::new("is_complete_section", DataType::Int64, false),
        Field::new("uploaded_at", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), dim as i32),
            true,
        ),
    ]))
}

pub fn chunk_to_record(entry: &DenseEntry, dim: usize) -> Result<RecordBatch> {
    let schema = chunk_schema(dim);

    let chunk_id = StringArray::from(vec![entry.chunk_id.as_str()]);
    let paper_id = StringArray::from(vec![entry.paper_id.as_str()]);
    let ordinal = Int64Array::from(vec![entry.ordinal as i64]);
    let content = StringArray::from(vec![entry.content.as_str()]);
    let source = StringArray::from(vec![entry.section_type.as_str()]);
    let section_title = StringArray::from(vec![entry.section_title.as_str()]);
    let page_range = StringArray::from(vec![entry.hierarchy_path.as_str()]);
    let char_count = Int64Array::from(vec![entry.char_count as i64]);
    let is_complete_section = Int64Array::from(vec![entry.is_complete_section as i64]);
    let uploaded_at = StringArray::from(vec![entry.uploaded_at.to_rfc3339()]);

    let embedding: Arc<dyn Array> = if let Some(ref emb) = entry.embedding {
        if emb.len() != dim {
            return Err(DbError::InvalidEmbeddingDimension { expected: dim, actual: emb.len() });
        }
        let values = Float32Array::from(emb.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        Arc::new(FixedSizeListArray::try_new(field, dim as i32, Arc::new(values), None)?)
    } else {
        Arc::new(FixedSizeListArray::new_null(Arc::new(Field::new("item", DataType::Float32, false)), dim as i32, 1))
    };

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(chunk_id) as Arc<dyn Array>,
            Arc::new(paper_id),
            Arc::new(ordinal),
            Arc::new(content),
            Arc::new(source),
            Arc::new(section_title),
            Arc::new(page_range),
            Arc::new(char_count),
            Arc::new(is_complete_section),
            Arc::new(uploaded_at),
            embedding,
        ],
    )?)
}

pub fn record_to_chunk(batch: &RecordBatch, row: usize) -> Result<DenseEntry> {
    let get_string = |col: usize| -> String {
        batch.column(col).as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string()
    };
    let get_i64 = |col: usize| -> i64 { batch.column(col).as_any().downcast_ref::<Int64Array>().unwrap().value(row) };
    let get_embedding = |col: usize| -> Option<Vec<f32>> {
        let arr = batch.column(col);
        if arr.is_null(row) {
            return None;
        }
        let list_arr = arr.as_any().downcast_ref::<FixedSizeListArray>()?;
        if list_arr.is_null(row) {
            return None;
        }
        let values = list_arr.value(row);
        let float_arr = values.as_any().downcast_ref::<Float32Array>()?;
        Some(float_arr.values().to_vec())
    };

    let section_type: SectionType = get_string(4).parse().unwrap_or(SectionType::Other);
    let uploaded_at: DateTime<Utc> =
        DateTime::parse_from_rfc3339(&get_string(9)).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now());

    Ok(DenseEntry {
        chunk_id: get_string(0),
        paper_id: get_string(1),
        ordinal: get_i64(2) as u32,
        content: get_string(3),
        section_type,
        section_title: get_string(5),
        hierarchy_path: get_string(6),
        char_count: get_i64(7) as usize,
        is_complete_section: get_i64(8) != 0,
        uploaded_at,
        embedding: get_embedding(10),
    })
}

pub fn default_embedding_dim() -> usize {
    EMBEDDING_DIM
}
