use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use regex_lite::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geo::{GeoMetric, Haversine, LatLng, LatLngBounds};
use crate::location::LocationSource;
use crate::record::{PermitField, PermitId, PermitRecord};
use crate::StoreError;

pub const SEARCH_FILTER: &str = "search";
pub const RADIUS_FILTER: &str = "radius";
pub const AUTHORITY_FILTER: &str = "spga";
pub const TYPES_FILTER: &str = "types";

/// One filter criterion. A record stays visible only while every active predicate
/// returns `true` for it.
pub type Predicate = Box<dyn Fn(&PermitRecord) -> bool>;

type Listener = Box<dyn FnMut(&StoreEvent)>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct SortSpec {
    pub field: PermitField,
    #[serde(default)]
    pub descending: bool,
}

impl SortSpec {
    #[must_use]
    pub fn ascending(field: PermitField) -> Self {
        Self { field, descending: false }
    }

    #[must_use]
    pub fn descending(field: PermitField) -> Self {
        Self { field, descending: true }
    }

    /// Absent values sort after present ones in both directions.
    #[must_use]
    pub fn compare(&self, lhs: &PermitRecord, rhs: &PermitRecord) -> Ordering {
        match (lhs.field(self.field), rhs.field(self.field)) {
            (Some(lhs), Some(rhs)) => {
                let ordering = lhs.natural_cmp(&rhs);
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    Fetching,
    Reset { total: usize },
    Filtered { visible: usize },
    Sorted { sort: Option<SortSpec> },
    SelectionChanged { previous: Option<PermitId>, current: Option<PermitId> },
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SelectionChange {
    Unchanged,
    /// The currently selected record was told to clear its flag directly.
    Ignored,
    Changed { previous: Option<PermitId>, current: Option<PermitId> },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

/// Fetch transport supplying a fresh batch of permits.
pub trait PermitSource {
    /// # Errors
    /// Returns [`StoreError::Fetch`] (or a validation error) when no batch is available.
    fn fetch(&mut self) -> Result<Vec<PermitRecord>, StoreError>;
}

impl<F> PermitSource for F
where
    F: FnMut() -> Result<Vec<PermitRecord>, StoreError>,
{
    fn fetch(&mut self) -> Result<Vec<PermitRecord>, StoreError> {
        self()
    }
}

pub struct PermitStore {
    records: Vec<PermitRecord>,
    index: HashMap<PermitId, usize>,
    display_order: Vec<usize>,
    active_filters: BTreeMap<String, Predicate>,
    sort: Option<SortSpec>,
    selected: Option<PermitId>,
    geo: Rc<dyn GeoMetric>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl Default for PermitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for PermitStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitStore")
            .field("records", &self.records.len())
            .field("active_filters", &self.active_filter_names())
            .field("sort", &self.sort)
            .field("selected", &self.selected)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl PermitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_geo(Haversine::default())
    }

    #[must_use]
    pub fn with_geo(geo: impl GeoMetric + 'static) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            display_order: Vec::new(),
            active_filters: BTreeMap::new(),
            sort: None,
            selected: None,
            geo: Rc::new(geo),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &PermitId) -> Option<&PermitRecord> {
        self.index.get(id).map(|&index| &self.records[index])
    }

    /// All records in display order.
    pub fn records(&self) -> impl Iterator<Item = &PermitRecord> + '_ {
        self.display_order.iter().map(|&index| &self.records[index])
    }

    /// Non-excluded records in display order.
    pub fn visible(&self) -> impl Iterator<Item = &PermitRecord> + '_ {
        self.records().filter(|record| !record.excluded())
    }

    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.records.iter().filter(|record| !record.excluded()).count()
    }

    // Events

    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when the subscription was already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(subscription, _)| *subscription != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    // Records

    /// Replace every record with a fresh batch.
    ///
    /// Derived flags of incoming records are reset, the selection is cleared, and the
    /// active filters and sort are re-applied.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicatePermit`] without
    /// touching the current records when the batch is malformed.
    pub fn replace_records(&mut self, records: Vec<PermitRecord>) -> Result<usize, StoreError> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            record.validate()?;
            if index.insert(record.id.clone(), position).is_some() {
                return Err(StoreError::DuplicatePermit(record.id.clone()));
            }
        }

        self.records = records;
        for record in &mut self.records {
            record.reset_derived();
        }
        self.index = index;
        self.display_order = (0..self.records.len()).collect();
        self.apply_sort();
        let previous = self.selected.take();

        let total = self.records.len();
        info!(total, "replaced permit records");
        self.emit(&StoreEvent::Reset { total });
        if previous.is_some() {
            self.emit(&StoreEvent::SelectionChanged { previous, current: None });
        }
        self.refresh();
        Ok(total)
    }

    /// Emit [`StoreEvent::Fetching`], then load the batch the source returns.
    ///
    /// # Errors
    /// Propagates the source error, or a batch validation error; the store keeps its
    /// current records in both cases.
    pub fn fetch<S>(&mut self, source: &mut S) -> Result<usize, StoreError>
    where
        S: PermitSource + ?Sized,
    {
        self.emit(&StoreEvent::Fetching);
        let records = source.fetch()?;
        self.replace_records(records)
    }

    // Filter engine

    /// Install (or replace) a named predicate and re-evaluate every record.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] when `name` is blank.
    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&PermitRecord) -> bool + 'static,
    ) -> Result<usize, StoreError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StoreError::Validation("filter name MUST be non-empty".to_string()));
        }
        Ok(self.insert_filter(name, Box::new(predicate)))
    }

    fn insert_filter(&mut self, name: String, predicate: Predicate) -> usize {
        self.active_filters.insert(name, predicate);
        self.refresh()
    }

    /// Remove a named predicate if present, then re-evaluate every record.
    pub fn remove_filter(&mut self, name: &str) -> bool {
        let removed = self.active_filters.remove(name).is_some();
        self.refresh();
        removed
    }

    #[must_use]
    pub fn has_filter(&self, name: &str) -> bool {
        self.active_filters.contains_key(name)
    }

    #[must_use]
    pub fn active_filter_names(&self) -> Vec<&str> {
        self.active_filters.keys().map(String::as_str).collect()
    }

    /// Recompute `excluded` for every record from the conjunction of active filters
    /// and emit the resulting visible count.
    pub fn refresh(&mut self) -> usize {
        let filters = &self.active_filters;
        let mut visible = 0_usize;
        for record in &mut self.records {
            let included = filters.values().all(|predicate| predicate(&*record));
            record.set_excluded(!included);
            if included {
                visible += 1;
            }
        }

        debug!(
            filters = ?self.active_filter_names(),
            visible,
            total = self.records.len(),
            "refreshed permit filters"
        );
        self.emit(&StoreEvent::Filtered { visible });
        visible
    }

    /// Filter on a description pattern; `None` clears the search filter.
    pub fn filter_by_description(&mut self, pattern: Option<Regex>) -> usize {
        match pattern {
            Some(pattern) => self.insert_filter(
                SEARCH_FILTER.to_string(),
                Box::new(move |record: &PermitRecord| {
                    record.description.as_deref().is_some_and(|text| pattern.is_match(text))
                }),
            ),
            None => self.remove_search_filter(),
        }
    }

    /// Case-insensitive literal search over descriptions. Regex metacharacters in
    /// `text` are escaped; `None` or empty text clears the search filter.
    ///
    /// # Errors
    /// Returns [`StoreError::Pattern`] when the escaped text exceeds the regex
    /// engine's size limits.
    pub fn filter_by_description_string(
        &mut self,
        text: Option<&str>,
    ) -> Result<usize, StoreError> {
        let Some(text) = text.filter(|text| !text.is_empty()) else {
            return Ok(self.remove_search_filter());
        };
        let pattern = RegexBuilder::new(&regex_lite::escape(text))
            .case_insensitive(true)
            .build()
            .map_err(|err| StoreError::Pattern(err.to_string()))?;
        Ok(self.filter_by_description(Some(pattern)))
    }

    fn remove_search_filter(&mut self) -> usize {
        self.remove_filter(SEARCH_FILTER);
        self.visible_count()
    }

    /// Keep records within `radius_meters` of `point`. An absent point or an absent,
    /// non-positive or non-finite radius clears the radius filter.
    pub fn filter_by_radius(&mut self, point: Option<LatLng>, radius_meters: Option<f64>) -> usize {
        let radius = radius_meters.filter(|radius| radius.is_finite() && *radius > 0.0);
        let (Some(point), Some(radius)) = (point, radius) else {
            return self.clear_radius_filter();
        };

        let geo = Rc::clone(&self.geo);
        self.insert_filter(
            RADIUS_FILTER.to_string(),
            Box::new(move |record: &PermitRecord| {
                record
                    .location
                    .is_some_and(|location| geo.distance_meters(location, point) <= radius)
            }),
        )
    }

    pub fn clear_radius_filter(&mut self) -> usize {
        self.remove_filter(RADIUS_FILTER);
        self.visible_count()
    }

    /// Keep records whose authority code is listed; `None` or an empty list clears
    /// the authority filter.
    pub fn filter_by_authority(&mut self, codes: Option<&[String]>) -> usize {
        self.membership_filter(AUTHORITY_FILTER, codes, |record| record.authority.as_deref())
    }

    /// Keep records whose permit type is listed; `None` or an empty list clears the
    /// types filter.
    pub fn filter_by_types(&mut self, types: Option<&[String]>) -> usize {
        self.membership_filter(TYPES_FILTER, types, |record| record.permit_type.as_deref())
    }

    fn membership_filter(
        &mut self,
        name: &str,
        allowed: Option<&[String]>,
        value: fn(&PermitRecord) -> Option<&str>,
    ) -> usize {
        let Some(allowed) = allowed.filter(|allowed| !allowed.is_empty()) else {
            self.remove_filter(name);
            return self.visible_count();
        };

        let allowed = allowed.to_vec();
        self.insert_filter(
            name.to_string(),
            Box::new(move |record: &PermitRecord| {
                value(record).is_some_and(|value| allowed.iter().any(|code| code == value))
            }),
        )
    }

    /// Bridge from the reference location. Same rules as [`Self::filter_by_radius`].
    pub fn update_radius_filter<L>(&mut self, location: &L) -> usize
    where
        L: LocationSource + ?Sized,
    {
        self.filter_by_radius(location.point(), location.radius_meters())
    }

    // Sort controller

    /// Install a field comparator, or restore natural order with `None`. Sorting is
    /// stable and never changes `excluded` or `selected`.
    pub fn sort_by_field(&mut self, field: Option<PermitField>, descending: bool) {
        self.sort = field.map(|field| SortSpec { field, descending });
        if self.sort.is_none() {
            self.display_order = (0..self.records.len()).collect();
        }
        self.apply_sort();
        debug!(sort = ?self.sort, "sorted permits");
        self.emit(&StoreEvent::Sorted { sort: self.sort });
    }

    #[must_use]
    pub fn sort_spec(&self) -> Option<SortSpec> {
        self.sort
    }

    fn apply_sort(&mut self) {
        let Some(spec) = self.sort else {
            return;
        };
        let records = &self.records;
        self.display_order.sort_by(|&lhs, &rhs| spec.compare(&records[lhs], &records[rhs]));
    }

    // Selection

    #[must_use]
    pub fn selected(&self) -> Option<&PermitRecord> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn selected_id(&self) -> Option<&PermitId> {
        self.selected.as_ref()
    }

    /// Make `id` the single selected record.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownPermit`] when no record has this id.
    pub fn select(&mut self, id: &PermitId) -> Result<SelectionChange, StoreError> {
        let index = self.index_of(id)?;
        if self.selected.as_ref() == Some(id) {
            return Ok(SelectionChange::Unchanged);
        }

        let previous = self.selected.take();
        if let Some(previous_index) = previous.as_ref().and_then(|prev| self.index.get(prev)) {
            self.records[*previous_index].set_selected(false);
        }
        self.records[index].set_selected(true);
        self.selected = Some(id.clone());

        debug!(previous = ?previous, current = %id, "permit selected");
        self.emit(&StoreEvent::SelectionChanged {
            previous: previous.clone(),
            current: Some(id.clone()),
        });
        Ok(SelectionChange::Changed { previous, current: Some(id.clone()) })
    }

    /// Per-record selection signal. Setting the flag selects the record; clearing the
    /// flag of the selected record directly is ignored, use
    /// [`PermitStore::clear_selection`] or select another record instead.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownPermit`] when no record has this id.
    pub fn set_selected(
        &mut self,
        id: &PermitId,
        selected: bool,
    ) -> Result<SelectionChange, StoreError> {
        if selected {
            return self.select(id);
        }

        self.index_of(id)?;
        if self.selected.as_ref() == Some(id) {
            debug!(permit = %id, "ignored direct deselect of selected permit");
            return Ok(SelectionChange::Ignored);
        }
        Ok(SelectionChange::Unchanged)
    }

    pub fn clear_selection(&mut self) -> SelectionChange {
        let Some(previous) = self.selected.take() else {
            return SelectionChange::Unchanged;
        };
        if let Some(&index) = self.index.get(&previous) {
            self.records[index].set_selected(false);
        }

        debug!(previous = %previous, "permit selection cleared");
        self.emit(&StoreEvent::SelectionChanged {
            previous: Some(previous.clone()),
            current: None,
        });
        SelectionChange::Changed { previous: Some(previous), current: None }
    }

    fn index_of(&self, id: &PermitId) -> Result<usize, StoreError> {
        self.index.get(id).copied().ok_or_else(|| StoreError::UnknownPermit(id.clone()))
    }

    // Bounds

    /// Smallest box covering every visible record with a location.
    #[must_use]
    pub fn visible_bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(
            self.records
                .iter()
                .filter(|record| !record.excluded())
                .filter_map(|record| record.location),
        )
    }
}
