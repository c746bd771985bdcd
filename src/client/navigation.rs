//! Plane-by-plane navigation through multi-dimensional units.
//!
//! A unit of rank `n >= 2` is shown one plane at a time: the trailing two
//! axes form the image, the `n - 2` leading axes are navigated by index.
//!
//! ```text
//!                 select(unit)
//!   NoUnitSelected ───────────► plane <= threshold ──► Fetching(Auto)
//!                               plane >  threshold ──► AwaitingUserFetch
//!
//!   AwaitingUserFetch ──fetch()──► Fetching(User)
//!   Fetching ──ok──► Displaying      Fetching ──err──► Failed
//!   Fetching ──cancel()──► Cancelled ──fetch()──► Fetching(User)
//!   any ──step(axis, ±n)──► Fetching(Navigation)   (no-op at a bound)
//! ```
//!
//! [`SliceNavigator`] is the pure state machine: actions return a
//! [`Transition`] naming the transfer to cancel and the fetch to issue.
//! [`SliceViewer`] executes transitions against a [`SliceFetcher`] and a
//! [`Renderer`]. Every fetch carries a generation number, and a completion
//! whose generation is no longer current is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::ElementType;
use crate::error::{NavigationError, TransferError};
use crate::server::{MetadataResponse, UnitMetadataResponse};
use crate::slice::{Range, SliceRequest};

use super::decoded::{DecodedSlice, PlaneDims};
use super::render::{surface_id, Renderer};
use super::transfer::Progress;

/// Planes up to this many bytes are fetched without asking.
pub const DEFAULT_AUTO_FETCH_THRESHOLD: u64 = 5 * 1024 * 1024;

// =============================================================================
// Units and navigation state
// =============================================================================

/// What the navigator needs to know about a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub index: usize,
    pub shape: Option<Vec<u64>>,
    pub element_type: Option<ElementType>,
}

impl UnitInfo {
    pub fn new(index: usize, shape: Option<Vec<u64>>, element_type: Option<ElementType>) -> Self {
        Self {
            index,
            shape,
            element_type,
        }
    }
}

impl From<&UnitMetadataResponse> for UnitInfo {
    fn from(unit: &UnitMetadataResponse) -> Self {
        Self {
            index: unit.index,
            shape: unit.shape.clone(),
            element_type: unit.array_type.as_deref().and_then(ElementType::from_tag),
        }
    }
}

/// Current index along each leading axis of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    shape: Vec<u64>,
    indices: Vec<u64>,
}

impl NavigationState {
    /// All leading indices start at 0. `None` for rank < 2 or an empty axis.
    pub fn new(shape: Vec<u64>) -> Option<Self> {
        if shape.len() < 2 || shape.contains(&0) {
            return None;
        }
        let indices = vec![0; shape.len() - 2];
        Some(Self { shape, indices })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Index along each leading axis, outermost first.
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn leading_axes(&self) -> usize {
        self.indices.len()
    }

    pub fn plane(&self) -> PlaneDims {
        let n = self.shape.len();
        PlaneDims {
            width: self.shape[n - 1],
            height: self.shape[n - 2],
        }
    }

    /// Size in bytes of one plane.
    pub fn plane_bytes(&self, element_type: ElementType) -> u64 {
        let plane = self.plane();
        plane
            .width
            .saturating_mul(plane.height)
            .saturating_mul(element_type.width() as u64)
    }

    /// Move along `axis` by `delta`, clamped to the axis.
    ///
    /// Returns whether the index changed.
    pub fn step(&mut self, axis: usize, delta: i64) -> Result<bool, NavigationError> {
        let leading = self.leading_axes();
        if axis >= leading {
            return Err(NavigationError::InvalidAxis { axis, leading });
        }

        let last = self.shape[axis] - 1;
        let current = self.indices[axis];
        let target = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta as u64).min(last)
        };

        if target == current {
            return Ok(false);
        }
        self.indices[axis] = target;
        Ok(true)
    }

    /// Leading axes pinned to the current index, trailing axes in full.
    pub fn ranges(&self) -> Vec<Range> {
        let n = self.shape.len();
        self.indices
            .iter()
            .map(|&i| Range::single(i))
            .chain(self.shape[n - 2..].iter().map(|&size| Range::full(size)))
            .collect()
    }

    /// The `slices` parameter for the current plane.
    pub fn slices(&self) -> String {
        self.ranges()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Shape of the slice returned for the current plane.
    pub fn result_shape(&self) -> Vec<u64> {
        self.ranges().iter().map(Range::len).collect()
    }
}

// =============================================================================
// Phases, commands, transitions
// =============================================================================

/// What started a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTrigger {
    /// The plane was small enough to fetch on selection
    Auto,
    /// Explicit fetch action
    User,
    /// A step along a leading axis
    Navigation,
}

/// Display phase of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewPhase {
    AwaitingUserFetch { estimated_bytes: u64 },
    Fetching { generation: u64, trigger: FetchTrigger },
    Displaying { generation: u64 },
    Cancelled,
    Failed { error: TransferError },
}

/// A slice request to issue on behalf of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    pub unit: usize,
    pub generation: u64,
    pub trigger: FetchTrigger,
    pub slices: String,
    /// Shape the response must have
    pub result_shape: Vec<u64>,
}

/// A transfer that is, or was, running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub unit: usize,
    pub generation: u64,
}

/// Effects of one navigator action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub cancel: Option<InFlight>,
    pub fetch: Option<FetchCommand>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.cancel.is_none() && self.fetch.is_none()
    }
}

/// How a finished transfer was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Display,
    Cancelled,
    Failed,
    /// The generation is no longer current; the result was dropped
    Stale,
}

/// Everything torn down by [`SliceNavigator::close`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closed {
    pub cancel: Option<InFlight>,
    pub units: Vec<usize>,
}

/// Per-unit navigation state and phase.
#[derive(Debug, Clone)]
pub struct UnitView {
    state: NavigationState,
    element_type: ElementType,
    phase: ViewPhase,
}

impl UnitView {
    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn phase(&self) -> &ViewPhase {
        &self.phase
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.state.plane_bytes(self.element_type)
    }
}

// =============================================================================
// SliceNavigator
// =============================================================================

/// The navigation state machine for one document.
#[derive(Debug, Clone)]
pub struct SliceNavigator {
    units: Vec<UnitInfo>,
    views: HashMap<usize, UnitView>,
    selected: Option<usize>,
    next_generation: u64,
    threshold: u64,
}

impl SliceNavigator {
    pub fn new(units: Vec<UnitInfo>) -> Self {
        Self {
            units,
            views: HashMap::new(),
            selected: None,
            next_generation: 1,
            threshold: DEFAULT_AUTO_FETCH_THRESHOLD,
        }
    }

    pub fn from_metadata(metadata: &MetadataResponse) -> Self {
        Self::new(metadata.hdus.iter().map(UnitInfo::from).collect())
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn units(&self) -> &[UnitInfo] {
        &self.units
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn view(&self, unit: usize) -> Option<&UnitView> {
        self.views.get(&unit)
    }

    pub fn phase(&self, unit: usize) -> Option<&ViewPhase> {
        self.view(unit).map(UnitView::phase)
    }

    /// Make `unit` the active unit.
    ///
    /// A unit already on display keeps its plane; otherwise the plane size
    /// decides between fetching now and waiting for [`fetch`](Self::fetch).
    /// A transfer running for the previously selected unit is cancelled.
    pub fn select(&mut self, unit: usize) -> Result<Transition, NavigationError> {
        let (state, element_type) = self.viewable(unit)?;
        if self.selected == Some(unit) {
            return Ok(Transition::default());
        }

        let cancel = self.selected.and_then(|previous| self.interrupt(previous));
        self.selected = Some(unit);

        let view = self.views.entry(unit).or_insert_with(|| UnitView {
            phase: ViewPhase::AwaitingUserFetch {
                estimated_bytes: state.plane_bytes(element_type),
            },
            state,
            element_type,
        });
        if matches!(view.phase, ViewPhase::Displaying { .. }) {
            return Ok(Transition {
                cancel,
                fetch: None,
            });
        }

        let estimated_bytes = view.estimated_bytes();
        let fetch = if estimated_bytes <= self.threshold {
            self.start(unit, FetchTrigger::Auto)
        } else {
            view.phase = ViewPhase::AwaitingUserFetch { estimated_bytes };
            None
        };

        Ok(Transition { cancel, fetch })
    }

    /// Fetch the current plane of the selected unit, restarting any
    /// transfer already running for it.
    pub fn fetch(&mut self) -> Result<Transition, NavigationError> {
        let unit = self.selected.ok_or(NavigationError::NoUnitSelected)?;
        let cancel = self.interrupt(unit);
        let fetch = self.start(unit, FetchTrigger::User);
        Ok(Transition { cancel, fetch })
    }

    /// Move the selected unit along a leading axis.
    ///
    /// Clamped at the axis bounds; a step that does not move is a no-op.
    pub fn step(&mut self, axis: usize, delta: i64) -> Result<Transition, NavigationError> {
        let unit = self.selected.ok_or(NavigationError::NoUnitSelected)?;
        let view = self
            .views
            .get_mut(&unit)
            .ok_or(NavigationError::NoUnitSelected)?;

        if !view.state.step(axis, delta)? {
            return Ok(Transition::default());
        }

        let cancel = self.interrupt(unit);
        let fetch = self.start(unit, FetchTrigger::Navigation);
        Ok(Transition { cancel, fetch })
    }

    /// Cancel the selected unit's transfer, if one is running.
    pub fn cancel(&mut self) -> Result<Transition, NavigationError> {
        let unit = self.selected.ok_or(NavigationError::NoUnitSelected)?;
        Ok(Transition {
            cancel: self.interrupt(unit),
            fetch: None,
        })
    }

    /// Record the outcome of the fetch `generation` for `unit`.
    pub fn complete(
        &mut self,
        unit: usize,
        generation: u64,
        outcome: Result<(), TransferError>,
    ) -> Completion {
        let Some(view) = self.views.get_mut(&unit) else {
            return Completion::Stale;
        };
        match view.phase {
            ViewPhase::Fetching { generation: current, .. } if current == generation => {}
            _ => return Completion::Stale,
        }

        match outcome {
            Ok(()) => {
                view.phase = ViewPhase::Displaying { generation };
                Completion::Display
            }
            Err(TransferError::Aborted) => {
                view.phase = ViewPhase::Cancelled;
                Completion::Cancelled
            }
            Err(error) => {
                view.phase = ViewPhase::Failed { error };
                Completion::Failed
            }
        }
    }

    /// Forget every unit's state and deselect.
    pub fn close(&mut self) -> Closed {
        let cancel = self.selected.and_then(|unit| self.interrupt(unit));
        let mut units: Vec<usize> = self.views.keys().copied().collect();
        units.sort_unstable();

        self.views.clear();
        self.selected = None;
        Closed { cancel, units }
    }

    fn viewable(&self, unit: usize) -> Result<(NavigationState, ElementType), NavigationError> {
        let info = self
            .units
            .iter()
            .find(|info| info.index == unit)
            .ok_or(NavigationError::UnknownUnit(unit))?;

        let not_viewable = |reason: &str| NavigationError::NotViewable {
            unit,
            reason: reason.to_string(),
        };
        let element_type = info
            .element_type
            .ok_or_else(|| not_viewable("no image data"))?;
        let shape = info.shape.clone().ok_or_else(|| not_viewable("no image data"))?;
        if shape.len() < 2 {
            return Err(not_viewable("fewer than two axes"));
        }
        let state = NavigationState::new(shape).ok_or_else(|| not_viewable("empty axis"))?;

        Ok((state, element_type))
    }

    /// Cancel `unit`'s running fetch, if any.
    fn interrupt(&mut self, unit: usize) -> Option<InFlight> {
        let view = self.views.get_mut(&unit)?;
        match view.phase {
            ViewPhase::Fetching { generation, .. } => {
                view.phase = ViewPhase::Cancelled;
                Some(InFlight { unit, generation })
            }
            _ => None,
        }
    }

    fn start(&mut self, unit: usize, trigger: FetchTrigger) -> Option<FetchCommand> {
        let view = self.views.get_mut(&unit)?;
        let generation = self.next_generation;
        self.next_generation += 1;

        view.phase = ViewPhase::Fetching {
            generation,
            trigger,
        };
        Some(FetchCommand {
            unit,
            generation,
            trigger,
            slices: view.state.slices(),
            result_shape: view.state.result_shape(),
        })
    }
}

// =============================================================================
// SliceViewer
// =============================================================================

/// Source of slices for a [`SliceViewer`].
#[async_trait]
pub trait SliceFetcher: Send + Sync {
    /// Download one slice, reporting progress; stop with
    /// [`TransferError::Aborted`] once `cancel` fires.
    async fn fetch(
        &self,
        request: SliceRequest,
        cancel: CancellationToken,
        on_progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<DecodedSlice, TransferError>;
}

#[async_trait]
impl<T: SliceFetcher + ?Sized> SliceFetcher for Arc<T> {
    async fn fetch(
        &self,
        request: SliceRequest,
        cancel: CancellationToken,
        on_progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<DecodedSlice, TransferError> {
        (**self).fetch(request, cancel, on_progress).await
    }
}

/// Result of a viewer action, once any fetch it started has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    /// Nothing to fetch and nothing on display
    Unchanged,
    /// The plane is over the auto-fetch threshold
    AwaitingUserFetch { estimated_bytes: u64 },
    /// The plane is on the unit's surface
    Displayed { unit: usize, shape: Vec<u64> },
    Cancelled,
    Failed(TransferError),
    /// A newer fetch replaced this one before it finished
    Superseded,
}

type ProgressCallback = Box<dyn Fn(usize, Progress) + Send + Sync>;

#[derive(Default)]
struct ViewerInner {
    navigator: Option<SliceNavigator>,
    tokens: HashMap<usize, (u64, CancellationToken)>,
    buffers: HashMap<usize, DecodedSlice>,
}

/// Drives a [`SliceNavigator`] for one file.
///
/// Actions take `&self`, so a cancel or a step can be issued while an
/// earlier action is still awaiting its transfer. The internal lock is
/// never held across an await.
pub struct SliceViewer<F, R> {
    path: String,
    fetcher: F,
    renderer: R,
    inner: Mutex<ViewerInner>,
    on_progress: ProgressCallback,
}

impl<F: SliceFetcher, R: Renderer> SliceViewer<F, R> {
    pub fn new(path: impl Into<String>, navigator: SliceNavigator, fetcher: F, renderer: R) -> Self {
        Self {
            path: path.into(),
            fetcher,
            renderer,
            inner: Mutex::new(ViewerInner {
                navigator: Some(navigator),
                ..Default::default()
            }),
            on_progress: Box::new(|_, _| {}),
        }
    }

    pub fn from_metadata(metadata: &MetadataResponse, fetcher: F, renderer: R) -> Self {
        Self::new(
            metadata.path.clone(),
            SliceNavigator::from_metadata(metadata),
            fetcher,
            renderer,
        )
    }

    /// Called with `(unit, progress)` after every received chunk.
    pub fn with_progress(mut self, on_progress: impl Fn(usize, Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Box::new(on_progress);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn lock(&self) -> MutexGuard<'_, ViewerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_navigator<T>(
        &self,
        action: impl FnOnce(&mut SliceNavigator) -> Result<T, NavigationError>,
    ) -> Result<T, NavigationError> {
        let mut inner = self.lock();
        let navigator = inner
            .navigator
            .as_mut()
            .ok_or(NavigationError::NoUnitSelected)?;
        action(navigator)
    }

    pub fn selected(&self) -> Option<usize> {
        self.lock().navigator.as_ref().and_then(SliceNavigator::selected)
    }

    pub fn phase(&self, unit: usize) -> Option<ViewPhase> {
        self.lock()
            .navigator
            .as_ref()
            .and_then(|n| n.phase(unit).cloned())
    }

    pub fn state(&self, unit: usize) -> Option<NavigationState> {
        self.lock()
            .navigator
            .as_ref()
            .and_then(|n| n.view(unit).map(|v| v.state().clone()))
    }

    /// Last plane displayed for `unit`.
    pub fn buffer(&self, unit: usize) -> Option<DecodedSlice> {
        self.lock().buffers.get(&unit).cloned()
    }

    pub async fn select(&self, unit: usize) -> Result<ViewOutcome, NavigationError> {
        let transition = self.with_navigator(|n| n.select(unit))?;
        let id = surface_id(unit);
        if !self.renderer.has_surface(&id) {
            self.renderer.create_surface(&id);
        }
        Ok(self.apply(unit, transition).await)
    }

    pub async fn fetch(&self) -> Result<ViewOutcome, NavigationError> {
        let (unit, transition) = self.with_navigator(|n| {
            let transition = n.fetch()?;
            Ok((n.selected().unwrap_or_default(), transition))
        })?;
        Ok(self.apply(unit, transition).await)
    }

    pub async fn step(&self, axis: usize, delta: i64) -> Result<ViewOutcome, NavigationError> {
        let (unit, transition) = self.with_navigator(|n| {
            let transition = n.step(axis, delta)?;
            Ok((n.selected().unwrap_or_default(), transition))
        })?;
        Ok(self.apply(unit, transition).await)
    }

    /// Cancel the selected unit's transfer. Returns whether one was running.
    pub fn cancel(&self) -> Result<bool, NavigationError> {
        let transition = self.with_navigator(SliceNavigator::cancel)?;
        let cancelled = transition.cancel.is_some();
        if let Some(in_flight) = transition.cancel {
            self.lock().cancel(in_flight);
        }
        Ok(cancelled)
    }

    /// Cancel everything and destroy every surface. The viewer is unusable
    /// afterwards.
    pub fn close(&self) {
        let mut inner = self.lock();
        let closed = inner
            .navigator
            .take()
            .map(|mut n| n.close())
            .unwrap_or_default();

        for (_, (_, token)) in inner.tokens.drain() {
            token.cancel();
        }
        inner.buffers.clear();

        for unit in closed.units {
            let id = surface_id(unit);
            if self.renderer.has_surface(&id) {
                self.renderer.destroy_surface(&id);
            }
        }
    }

    async fn apply(&self, unit: usize, transition: Transition) -> ViewOutcome {
        let (command, token) = {
            let mut inner = self.lock();
            if let Some(in_flight) = transition.cancel {
                inner.cancel(in_flight);
            }
            let Some(command) = transition.fetch else {
                return inner.settled(unit);
            };
            let token = CancellationToken::new();
            inner
                .tokens
                .insert(command.unit, (command.generation, token.clone()));
            (command, token)
        };

        debug!(
            unit = command.unit,
            generation = command.generation,
            trigger = ?command.trigger,
            slices = %command.slices,
            "Fetching plane"
        );

        let request = SliceRequest::new(self.path.clone(), command.unit, command.slices.clone());
        let on_progress = |progress: Progress| (self.on_progress)(command.unit, progress);
        let result = self
            .fetcher
            .fetch(request, token, &on_progress)
            .await
            .and_then(|slice| {
                if slice.shape == command.result_shape {
                    Ok(slice)
                } else {
                    Err(TransferError::Protocol(format!(
                        "expected shape {:?}, received {:?}",
                        command.result_shape, slice.shape
                    )))
                }
            });

        let mut guard = self.lock();
        let inner = &mut *guard;
        if matches!(inner.tokens.get(&command.unit), Some((g, _)) if *g == command.generation) {
            inner.tokens.remove(&command.unit);
        }

        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        let Some(navigator) = inner.navigator.as_mut() else {
            return ViewOutcome::Superseded;
        };

        match (navigator.complete(command.unit, command.generation, outcome), result) {
            (Completion::Display, Ok(slice)) => {
                let shape = slice.shape.clone();
                self.render(command.unit, &slice);
                inner.buffers.insert(command.unit, slice);
                ViewOutcome::Displayed {
                    unit: command.unit,
                    shape,
                }
            }
            (Completion::Cancelled, _) => ViewOutcome::Cancelled,
            (Completion::Failed, Err(error)) => {
                warn!(unit = command.unit, error = %error, "Plane fetch failed");
                ViewOutcome::Failed(error)
            }
            // Interrupted by cancel or by switching units, with no newer fetch
            _ if navigator.phase(command.unit) == Some(&ViewPhase::Cancelled) => {
                ViewOutcome::Cancelled
            }
            _ => ViewOutcome::Superseded,
        }
    }

    fn render(&self, unit: usize, slice: &DecodedSlice) {
        let Some(plane) = slice.plane_dims() else {
            return;
        };
        let id = surface_id(unit);
        if !self.renderer.has_surface(&id) {
            self.renderer.create_surface(&id);
        }
        self.renderer.set_image(
            &id,
            &slice.bytes,
            plane.width,
            plane.height,
            slice.element_type.tag(),
        );
    }
}

impl ViewerInner {
    fn cancel(&mut self, in_flight: InFlight) {
        if matches!(self.tokens.get(&in_flight.unit), Some((g, _)) if *g == in_flight.generation) {
            if let Some((_, token)) = self.tokens.remove(&in_flight.unit) {
                token.cancel();
            }
        }
    }

    /// Outcome for an action that issued no fetch.
    fn settled(&self, unit: usize) -> ViewOutcome {
        let phase = self.navigator.as_ref().and_then(|n| n.phase(unit));
        match phase {
            Some(ViewPhase::AwaitingUserFetch { estimated_bytes }) => {
                ViewOutcome::AwaitingUserFetch {
                    estimated_bytes: *estimated_bytes,
                }
            }
            Some(ViewPhase::Displaying { .. }) => match self.buffers.get(&unit) {
                Some(slice) => ViewOutcome::Displayed {
                    unit,
                    shape: slice.shape.clone(),
                },
                None => ViewOutcome::Unchanged,
            },
            Some(ViewPhase::Cancelled) => ViewOutcome::Cancelled,
            Some(ViewPhase::Failed { error }) => ViewOutcome::Failed(error.clone()),
            _ => ViewOutcome::Unchanged,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
