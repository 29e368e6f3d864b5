//! Relation resolution: grouped cursor scans with cascading population.

use crate::error::{CoreError, CoreResult};
use crate::scan::CursorScanner;
use crate::schema::{Cardinality, RelationDef, Schema};
use crate::txn::TransactionContext;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use weftdb_codec::{Key, Record};

/// Predicate applied to candidate related records.
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Options for populating one relation.
#[derive(Clone, Default)]
pub struct WithOptions {
    disabled: bool,
    filter: Option<RecordFilter>,
    limit: Option<usize>,
    nested: Option<WithSpec>,
}

impl WithOptions {
    /// Default options: enabled, unfiltered, unlimited, no nesting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly disables the relation; it is skipped entirely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Filters candidate related records before they are matched.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Caps how many matches each source record accumulates.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Recursively populates relations of the related records.
    #[must_use]
    pub fn nested(mut self, spec: WithSpec) -> Self {
        self.nested = Some(spec);
        self
    }
}

impl std::fmt::Debug for WithOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithOptions")
            .field("disabled", &self.disabled)
            .field("filtered", &self.filter.is_some())
            .field("limit", &self.limit)
            .field("nested", &self.nested)
            .finish()
    }
}

/// The relation-population request: relation name to options.
///
/// The spec is a finite tree supplied by the caller; recursion during
/// resolution follows this tree, never the full relation graph, so
/// cyclic relation declarations cannot cause unbounded work.
#[derive(Clone, Default, Debug)]
pub struct WithSpec {
    relations: BTreeMap<String, WithOptions>,
}

impl WithSpec {
    /// Creates an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a relation with explicit options.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, options: WithOptions) -> Self {
        self.relations.insert(name.into(), options);
        self
    }

    /// Requests relations by name with default options.
    #[must_use]
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new();
        for name in names {
            spec.relations.insert(name.into(), WithOptions::new());
        }
        spec
    }

    /// Checks whether the spec requests nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Iterates over requested relations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WithOptions)> {
        self.relations.iter()
    }
}

/// A root or related record with its populated relations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    /// The record's primary key.
    pub key: Key,
    /// The record itself (never mutated in storage by resolution).
    pub record: Record,
    /// Populated relations by name.
    pub relations: BTreeMap<String, ResolvedRelation>,
}

impl ResolvedRecord {
    /// Wraps a bare record with no populated relations.
    #[must_use]
    pub fn new(key: Key, record: Record) -> Self {
        Self {
            key,
            record,
            relations: BTreeMap::new(),
        }
    }

    /// Returns a populated relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&ResolvedRelation> {
        self.relations.get(name)
    }
}

/// A populated relation value, shaped by cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRelation {
    /// One-to-one: the last match in scan order, if any.
    One(Option<Box<ResolvedRecord>>),
    /// One-to-many: matches appended in scan order.
    Many(Vec<ResolvedRecord>),
}

impl ResolvedRelation {
    /// Returns the single related record of a one-to-one relation.
    #[must_use]
    pub fn as_one(&self) -> Option<&ResolvedRecord> {
        match self {
            ResolvedRelation::One(value) => value.as_deref(),
            ResolvedRelation::Many(_) => None,
        }
    }

    /// Returns the related records of a one-to-many relation.
    #[must_use]
    pub fn as_many(&self) -> &[ResolvedRecord] {
        match self {
            ResolvedRelation::Many(records) => records,
            ResolvedRelation::One(_) => &[],
        }
    }
}

/// Resolves relations for one source collection.
///
/// Resolution never mutates storage: it augments in-memory copies of the
/// root records. Nested expansion recurses depth-first over the newly
/// discovered related records only, using the target collection's own
/// resolver, so relation definitions remain scoped to their owning
/// collection.
pub struct RelationResolver {
    schema: Arc<Schema>,
    collection: String,
}

impl RelationResolver {
    /// Creates a resolver for a source collection.
    pub fn new(schema: Arc<Schema>, collection: impl Into<String>) -> Self {
        Self {
            schema,
            collection: collection.into(),
        }
    }

    /// Resolves every relation requested by `spec` against `roots`.
    pub fn resolve(
        &self,
        ctx: &mut TransactionContext,
        roots: Vec<(Key, Record)>,
        spec: &WithSpec,
    ) -> CoreResult<Vec<ResolvedRecord>> {
        let mut resolved: Vec<ResolvedRecord> = roots
            .into_iter()
            .map(|(key, record)| ResolvedRecord::new(key, record))
            .collect();
        for (name, options) in spec.iter() {
            if options.disabled {
                continue;
            }
            let def = self.schema.relation(&self.collection, name)?.clone();
            self.populate(ctx, &mut resolved, &def, options)?;
        }
        Ok(resolved)
    }

    /// Populates one relation across all roots with a single scan of the
    /// target collection.
    fn populate(
        &self,
        ctx: &mut TransactionContext,
        roots: &mut [ResolvedRecord],
        def: &RelationDef,
        options: &WithOptions,
    ) -> CoreResult<()> {
        // Group roots by their source-field key and initialize every
        // root's slot to the empty shape for the cardinality.
        let mut groups: HashMap<Key, Vec<usize>> = HashMap::new();
        for (i, root) in roots.iter_mut().enumerate() {
            let empty = match def.cardinality {
                Cardinality::OneToOne => ResolvedRelation::One(None),
                Cardinality::OneToMany => ResolvedRelation::Many(Vec::new()),
            };
            root.relations.insert(def.name.clone(), empty);
            if let Some(key) = root.record.field_key(&def.source_field) {
                groups.entry(key).or_default().push(i);
            }
        }

        let mut counts = vec![0usize; roots.len()];
        let mut matched_one: Vec<Option<Key>> = vec![None; roots.len()];
        let mut matched_many: Vec<Vec<Key>> = vec![Vec::new(); roots.len()];
        let mut used: Vec<(Key, Record)> = Vec::new();
        let mut used_keys: BTreeSet<Key> = BTreeSet::new();

        let stream = CursorScanner::new(ctx, def.target_collection.as_str()).stream()?;
        for entry in stream {
            let entry = entry?;
            if groups.is_empty() {
                break;
            }
            let Some(group_key) = entry.record.field_key(&def.target_field) else {
                continue;
            };
            let Some(indices) = groups.get(&group_key).cloned() else {
                continue;
            };
            if let Some(filter) = &options.filter {
                if !filter(&entry.record) {
                    continue;
                }
            }

            let mut saturated = Vec::new();
            for &i in &indices {
                match def.cardinality {
                    // One-to-one overwrites unconditionally: the result
                    // reflects the last match in scan order.
                    Cardinality::OneToOne => matched_one[i] = Some(entry.primary_key.clone()),
                    Cardinality::OneToMany => matched_many[i].push(entry.primary_key.clone()),
                }
                counts[i] += 1;
                if let Some(limit) = options.limit {
                    if counts[i] >= limit {
                        saturated.push(i);
                    }
                }
            }
            if used_keys.insert(entry.primary_key.clone()) {
                used.push((entry.primary_key.clone(), entry.record));
            }
            if !saturated.is_empty() {
                // A saturated root stops accumulating: remove it from the
                // candidate group, and drop the group once empty so the
                // scan can skip this key entirely.
                if let Some(group) = groups.get_mut(&group_key) {
                    group.retain(|i| !saturated.contains(i));
                    if group.is_empty() {
                        groups.remove(&group_key);
                    }
                }
            }
        }

        // Expand the newly discovered records, then attach them. Nested
        // recursion runs against the flat `used` list, never against the
        // already-expanded roots.
        let expanded: HashMap<Key, ResolvedRecord> = match &options.nested {
            Some(nested) if !nested.is_empty() => {
                let resolver =
                    RelationResolver::new(Arc::clone(&self.schema), def.target_collection.as_str());
                resolver
                    .resolve(ctx, used, nested)?
                    .into_iter()
                    .map(|record| (record.key.clone(), record))
                    .collect()
            }
            _ => used
                .into_iter()
                .map(|(key, record)| (key.clone(), ResolvedRecord::new(key, record)))
                .collect(),
        };

        let lookup = |key: &Key| -> CoreResult<ResolvedRecord> {
            expanded.get(key).cloned().ok_or_else(|| {
                CoreError::invalid_operation(format!(
                    "related record {key} vanished during resolution"
                ))
            })
        };

        for (i, root) in roots.iter_mut().enumerate() {
            let value = match def.cardinality {
                Cardinality::OneToOne => match &matched_one[i] {
                    Some(key) => ResolvedRelation::One(Some(Box::new(lookup(key)?))),
                    None => continue,
                },
                Cardinality::OneToMany => {
                    if matched_many[i].is_empty() {
                        continue;
                    }
                    let mut records = Vec::with_capacity(matched_many[i].len());
                    for key in &matched_many[i] {
                        records.push(lookup(key)?);
                    }
                    ResolvedRelation::Many(records)
                }
            };
            root.relations.insert(def.name.clone(), value);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RelationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationResolver")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod limit_props {
    use super::*;
    use crate::schema::CollectionDef;
    use proptest::prelude::*;
    use weftdb_codec::KeyPath;
    use weftdb_engine::{AccessMode, MemoryEngine, StorageEngine};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// For any distribution of children over parents and any limit,
        /// each parent resolves min(true count, limit) children, and they
        /// are the first ones in scan order.
        #[test]
        fn limit_invariant(
            owners in proptest::collection::vec(0i64..5, 0..40),
            limit in 1usize..6,
        ) {
            let schema = Arc::new(
                Schema::new()
                    .collection(
                        CollectionDef::new("parents")
                            .key_path(KeyPath::single("id"))
                            .relation(RelationDef::one_to_many(
                                "children", "parents", "id", "children", "parentId",
                            )),
                    )
                    .collection(CollectionDef::new("children").key_path(KeyPath::single("id"))),
            );
            let engine = MemoryEngine::new();
            for def in schema.iter() {
                engine.create_collection(def.engine_config()).unwrap();
            }
            let mut ctx = TransactionContext::new(
                engine
                    .begin(&schema.collection_names(), AccessMode::ReadWrite)
                    .unwrap(),
            );
            for parent in 0i64..5 {
                ctx.add("parents", None, &Record::new().with("id", parent)).unwrap();
            }
            let mut true_counts = vec![0usize; 5];
            for (child_id, owner) in owners.iter().enumerate() {
                true_counts[*owner as usize] += 1;
                ctx.add(
                    "children",
                    None,
                    &Record::new().with("id", child_id as i64).with("parentId", *owner),
                )
                .unwrap();
            }

            let resolver = RelationResolver::new(Arc::clone(&schema), "parents");
            let parents = ctx.get_all("parents").unwrap();
            let spec = WithSpec::new().relation("children", WithOptions::new().limit(limit));
            let resolved = resolver.resolve(&mut ctx, parents, &spec).unwrap();

            for (i, parent) in resolved.iter().enumerate() {
                let children = parent.relation("children").unwrap().as_many();
                prop_assert_eq!(children.len(), true_counts[i].min(limit));
                // Scan order: child keys ascend.
                let keys: Vec<_> = children.iter().map(|c| c.key.clone()).collect();
                let mut sorted = keys.clone();
                sorted.sort();
                prop_assert_eq!(keys, sorted);
            }
        }
    }
}
