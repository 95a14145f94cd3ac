//! Direct accessor over the primary store, search index and history log.

use super::ranking::{favorites_first, filter_order_queries, merge_dedup, top_n};
use super::search::two_phase;
use super::DataAccessor;
use crate::models::{
    ApplicationConfig, HistoryItem, Idiom, IdiomField, IdiomId, IdiomOrder, IdiomQuery, ImplId,
    SearchDocument, StorageKey, TextQuery,
};
use crate::observability::{RequestContext, RequestContextGuard, enter_request_context};
use crate::storage::{HistoryLog, IdiomPersistence, IndexBackend};
use crate::tasks::{Job, TaskRunner};
use crate::{Error, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::instrument;

/// Accessor reading and writing the stores directly.
///
/// Writes go to the primary store synchronously; the search document and the
/// history snapshot follow through the task runner.
pub struct StoreAccessor {
    persistence: Arc<dyn IdiomPersistence>,
    index: Arc<dyn IndexBackend>,
    history: Arc<dyn HistoryLog>,
    tasks: Arc<dyn TaskRunner>,
}

impl StoreAccessor {
    /// Creates an accessor over the given stores.
    #[must_use]
    pub fn new(
        persistence: Arc<dyn IdiomPersistence>,
        index: Arc<dyn IndexBackend>,
        history: Arc<dyn HistoryLog>,
        tasks: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            persistence,
            index,
            history,
            tasks,
        }
    }

    fn enter(ctx: &RequestContext) -> RequestContextGuard {
        enter_request_context(ctx.clone())
    }

    fn schedule_follow_ups(&self, key: StorageKey) {
        self.tasks.submit(Job::IndexIdiom(key));
        self.tasks.submit(Job::SaveHistoryItem(key));
    }

    fn idioms_of(&self, query: &IdiomQuery) -> Result<Vec<Idiom>> {
        Ok(self
            .persistence
            .query(query)?
            .into_iter()
            .map(|(_, idiom)| idiom)
            .collect())
    }

    /// Runs one full-text query and resolves its hits in index order.
    ///
    /// Hits whose primary record is gone are skipped.
    fn run_text_query(&self, query: &TextQuery, limit: usize) -> Result<Vec<Idiom>> {
        let doc_ids = self.index.search(query, limit)?;
        let keys = doc_ids
            .iter()
            .map(|doc_id| {
                StorageKey::decode(doc_id).map_err(|_| {
                    Error::Inconsistent(format!("search document id {doc_id:?} is not a key"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let found = self.persistence.get_batch(&keys)?;
        let hits = keys.len();
        let idioms: Vec<Idiom> = found.into_iter().flatten().collect();
        if idioms.len() < hits {
            tracing::debug!(
                stale = hits - idioms.len(),
                "Skipping search hits without primary record"
            );
        }
        Ok(idioms)
    }
}

impl DataAccessor for StoreAccessor {
    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), idiom_id = %id))]
    fn get_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<(StorageKey, Idiom)> {
        let _guard = Self::enter(ctx);
        let key = StorageKey::for_idiom(id);
        self.persistence
            .get(&key)?
            .map(|idiom| (key, idiom))
            .ok_or_else(|| Error::NotFound(format!("idiom {id}")))
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), impl_id = %impl_id))]
    fn get_idiom_by_impl_id(
        &self,
        ctx: &RequestContext,
        impl_id: ImplId,
    ) -> Result<(StorageKey, Idiom)> {
        let _guard = Self::enter(ctx);
        let mut owners = self.persistence.find_by_impl_id(impl_id)?;
        match owners.len() {
            0 => Err(Error::NotFound(format!("implementation {impl_id}"))),
            1 => owners
                .pop()
                .ok_or_else(|| Error::NotFound(format!("implementation {impl_id}"))),
            n => Err(Error::Inconsistent(format!(
                "implementation {impl_id} is owned by {n} idioms"
            ))),
        }
    }

    #[instrument(skip(self, ctx, idiom), fields(request_id = ctx.request_id(), idiom_id = %idiom.id))]
    fn save_new_idiom(&self, ctx: &RequestContext, idiom: &mut Idiom) -> Result<StorageKey> {
        let _guard = Self::enter(ctx);
        if idiom.id.get() <= 0 {
            return Err(Error::InvalidInput(format!(
                "idiom id must be positive, got {}",
                idiom.id
            )));
        }
        let now = Utc::now();
        idiom.creation_date = now;
        idiom.version_date = now;
        idiom.version = 1;
        idiom.refresh_impl_count();

        let key = StorageKey::for_idiom(idiom.id);
        self.persistence.put(&key, idiom)?;
        self.schedule_follow_ups(key);
        tracing::info!(version = idiom.version, "Saved new idiom");
        Ok(key)
    }

    #[instrument(skip(self, ctx, idiom), fields(request_id = ctx.request_id(), key = %key))]
    fn save_existing_idiom(
        &self,
        ctx: &RequestContext,
        key: &StorageKey,
        idiom: &mut Idiom,
    ) -> Result<()> {
        let _guard = Self::enter(ctx);
        idiom.version += 1;
        idiom.version_date = Utc::now();
        idiom.refresh_impl_count();

        self.persistence.put(key, idiom)?;
        self.schedule_follow_ups(*key);
        tracing::info!(version = idiom.version, "Saved idiom");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), idiom_id = %id))]
    fn delete_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<()> {
        let (key, _) = self.get_idiom(ctx, id)?;
        let _guard = Self::enter(ctx);
        self.persistence.delete(&key)?;
        // The record is gone, so indexing removes the search document
        self.tasks.submit(Job::IndexIdiom(key));
        tracing::info!("Deleted idiom");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), idiom_id = %idiom_id, impl_id = %impl_id))]
    fn delete_impl(
        &self,
        ctx: &RequestContext,
        idiom_id: IdiomId,
        impl_id: ImplId,
    ) -> Result<()> {
        let (key, mut idiom) = self.get_idiom(ctx, idiom_id)?;
        let Some((position, _)) = idiom.find_impl(impl_id) else {
            return Err(Error::NotFound(format!(
                "implementation {impl_id} in idiom {idiom_id}"
            )));
        };
        idiom.implementations.remove(position);
        self.save_existing_idiom(ctx, &key, &mut idiom)
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn delete_all_idioms(&self, ctx: &RequestContext) -> Result<()> {
        let _guard = Self::enter(ctx);
        let keys = self.persistence.list_keys()?;
        // The index has no batch removal
        for key in &keys {
            self.index.remove(&key.encode())?;
        }
        let deleted = self.persistence.delete_batch(&keys)?;
        tracing::info!(deleted, "Deleted all idioms");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn get_all_idioms(
        &self,
        ctx: &RequestContext,
        limit: usize,
        order: Option<IdiomOrder>,
    ) -> Result<(Vec<StorageKey>, Vec<Idiom>)> {
        let _guard = Self::enter(ctx);
        let mut query = IdiomQuery::new().with_limit(limit);
        if let Some(order) = order {
            query = query.order_by(order);
        }
        Ok(self.persistence.query(&query)?.into_iter().unzip())
    }

    fn search_idioms_by_words(
        &self,
        ctx: &RequestContext,
        words: &[String],
        language: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        match language {
            None => self.search_idioms_by_words_with_favorites(ctx, words, &[], true, limit),
            Some(language) => self.search_idioms_by_words_with_favorites(
                ctx,
                words,
                &[language.to_string()],
                false,
                limit,
            ),
        }
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn search_idioms_by_words_with_favorites(
        &self,
        ctx: &RequestContext,
        words: &[String],
        favorites: &[String],
        see_non_favorite: bool,
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        let _guard = Self::enter(ctx);
        let base = TextQuery::words(words);
        two_phase(&base, favorites, see_non_favorite, limit, |query, limit| {
            self.run_text_query(query, limit)
        })
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn search_idioms_by_langs(
        &self,
        ctx: &RequestContext,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        let _guard = Self::enter(ctx);
        let language = match languages {
            [] => return Err(Error::InvalidInput("no language given".to_string())),
            [language] => language,
            _ => {
                return Err(Error::Unsupported(
                    "list for more than 1 language".to_string(),
                ));
            },
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.idioms_of(
            &IdiomQuery::new()
                .with_language(language.clone())
                .order_by(IdiomOrder::desc(IdiomField::Rating))
                .order_by(IdiomOrder::desc(IdiomField::Id))
                .with_limit(limit),
        )
    }

    fn recent_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>> {
        let order = IdiomOrder::desc(IdiomField::VersionDate);
        let merged = self.idioms_filter_order(ctx, favorites, n, show_other, order)?;
        Ok(top_n(merged, order, n))
    }

    fn popular_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>> {
        let order = IdiomOrder::desc(IdiomField::Rating);
        let merged = self.idioms_filter_order(ctx, favorites, n, show_other, order)?;
        Ok(top_n(merged, order, n))
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), order = %order))]
    fn idioms_filter_order(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        limit_each_lang: usize,
        show_other: bool,
        order: IdiomOrder,
    ) -> Result<Vec<Idiom>> {
        let _guard = Self::enter(ctx);
        if limit_each_lang == 0 {
            return Ok(Vec::new());
        }
        let lists = filter_order_queries(favorites, limit_each_lang, show_other, order)
            .iter()
            .map(|query| self.idioms_of(query))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = merge_dedup(lists);
        favorites_first(&mut merged, favorites, true);
        Ok(merged)
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn languages_having_impl(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let _guard = Self::enter(ctx);
        self.persistence.first_language_per_idiom()
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn random_idiom(&self, ctx: &RequestContext) -> Result<(StorageKey, Idiom)> {
        let _guard = Self::enter(ctx);
        let count = self.persistence.count()?;
        if count == 0 {
            return Err(Error::NotFound("no idiom stored".to_string()));
        }
        let offset = rand::rng().random_range(0..count);
        self.persistence
            .query(
                &IdiomQuery::new()
                    .order_by(IdiomOrder::asc(IdiomField::Id))
                    .with_offset(offset)
                    .with_limit(1),
            )?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no idiom at offset {offset}")))
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn next_idiom_id(&self, ctx: &RequestContext) -> Result<IdiomId> {
        let _guard = Self::enter(ctx);
        let max = self.idioms_of(
            &IdiomQuery::new()
                .order_by(IdiomOrder::desc(IdiomField::Id))
                .with_limit(1),
        )?;
        Ok(max
            .first()
            .map_or(IdiomId::new(1), |idiom| IdiomId::new(idiom.id.get() + 1)))
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn next_impl_id(&self, ctx: &RequestContext) -> Result<ImplId> {
        let _guard = Self::enter(ctx);
        let Some((_, holder)) = self.persistence.idiom_with_max_impl_id()? else {
            return Ok(ImplId::new(0));
        };
        let max = holder.max_impl_id().ok_or_else(|| {
            Error::Inconsistent(format!("idiom {} has no implementation", holder.id))
        })?;
        let candidate = ImplId::new(max.get() + 1);
        if !self.persistence.find_by_impl_id(candidate)?.is_empty() {
            return Err(Error::Conflict(format!(
                "implementation {candidate} already exists"
            )));
        }
        Ok(candidate)
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn get_app_config(&self, ctx: &RequestContext) -> Result<ApplicationConfig> {
        let _guard = Self::enter(ctx);
        let properties = self.persistence.load_app_config()?;
        let Some(first) = properties.first() else {
            return Err(Error::NotFound(
                "no application config property stored".to_string(),
            ));
        };
        Ok(ApplicationConfig::from_properties(
            first.app_config_id,
            &properties,
        ))
    }

    #[instrument(skip(self, ctx, config), fields(request_id = ctx.request_id(), toggles = config.toggles.len()))]
    fn save_app_config(&self, ctx: &RequestContext, config: &ApplicationConfig) -> Result<()> {
        let _guard = Self::enter(ctx);
        self.persistence.save_app_config(&config.to_properties())
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id(), idiom_id = %id))]
    fn idiom_history(&self, ctx: &RequestContext, id: IdiomId) -> Result<Vec<HistoryItem>> {
        let _guard = Self::enter(ctx);
        self.history.list_for(id)
    }

    #[instrument(skip(self, ctx), fields(request_id = ctx.request_id()))]
    fn reindex_all(&self, ctx: &RequestContext) -> Result<usize> {
        let _guard = Self::enter(ctx);
        self.index.clear()?;
        let mut indexed = 0;
        for (key, idiom) in self.persistence.query(&IdiomQuery::new())? {
            self.index.put(&SearchDocument::from_idiom(&key, &idiom))?;
            indexed += 1;
        }
        tracing::info!(indexed, "Rebuilt search index");
        Ok(indexed)
    }

    fn delete_cache(&self, _ctx: &RequestContext) -> Result<()> {
        Ok(())
    }
}
