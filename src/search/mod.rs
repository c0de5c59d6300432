//! Tantivy-based search index module.
//!
//! Full-text search over fez titles, descriptions, locations and type labels
//! with field boosting. Private fezzes are never indexed.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::fez::Fez;

const BOOST_TITLE: f32 = 10.0;
const BOOST_INFO: f32 = 7.0;
const BOOST_LOCATION: f32 = 5.0;
const BOOST_TYPE: f32 = 2.5;

/// Search result with fez id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub fez_id: Uuid,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    fez_id: Field,
    title: Field,
    info: Field,
    location: Field,
    type_label: Field,
}

/// Tantivy search index for fezzes.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let fez_id = schema_builder.add_text_field("fez_id", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT);
        let info = schema_builder.add_text_field("info", TEXT);
        let location = schema_builder.add_text_field("location", TEXT);
        let type_label = schema_builder.add_text_field("type_label", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            fez_id,
            title,
            info,
            location,
            type_label,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index. Returns the number of fezzes indexed.
    pub async fn rebuild(&self, fezzes: &[Fez]) -> Result<usize, AppError> {
        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;

        let mut indexed = 0;
        for fez in fezzes.iter().filter(|f| !f.is_closed()) {
            writer.add_document(self.create_document(fez))?;
            indexed += 1;
        }

        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} fezzes", indexed);
        Ok(indexed)
    }

    /// Index or re-index a single fez. Private fezzes are skipped.
    pub async fn index_fez(&self, fez: &Fez) -> Result<(), AppError> {
        if fez.is_closed() {
            return Ok(());
        }

        let mut writer = self.writer.write().await;
        let term = tantivy::Term::from_field_text(self.fields.fez_id, &fez.id.to_string());
        writer.delete_term(term);
        writer.add_document(self.create_document(fez))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search for fezzes matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.title,
                self.fields.info,
                self.fields.location,
                self.fields.type_label,
            ],
        );
        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Validation(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        let field_queries = [
            (self.fields.title, BOOST_TITLE),
            (self.fields.info, BOOST_INFO),
            (self.fields.location, BOOST_LOCATION),
            (self.fields.type_label, BOOST_TYPE),
        ];
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let raw = doc.get_first(self.fields.fez_id)?.as_str()?;
                let fez_id = Uuid::parse_str(raw).ok()?;
                Some(SearchResult { fez_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, fez: &Fez) -> TantivyDocument {
        doc!(
            self.fields.fez_id => fez.id.to_string(),
            self.fields.title => fez.title.clone(),
            self.fields.info => fez.info.clone(),
            self.fields.location => fez.location.clone(),
            self.fields.type_label => fez.fez_type.label().to_string()
        )
    }
}
