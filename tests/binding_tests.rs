use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use canvas_bitmap_size::core::{
    bind_to, run_until_quiescent, BindingTarget, BitmapSizeBinding, BitmapSizeBindingBuilder,
    HeadlessCanvas, HeadlessDisplay, HeadlessResizeObserver, ManualTimer, ObserverMode, Strategy,
};
use canvas_bitmap_size::traits::{CanvasElement, ElementId, ResizeEntry};
use canvas_bitmap_size::{BindingOptions, Error, Size};
use futures::executor::LocalPool;

type SuggestionLog = Rc<RefCell<Vec<(Option<Size>, Option<Size>)>>>;
type BitmapLog = Rc<RefCell<Vec<(Size, Size)>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Binding that goes straight to the pixel density fallback
fn density_binding(
    client: Size,
    ratio: f64,
) -> (BitmapSizeBinding, Rc<HeadlessCanvas>, Rc<HeadlessDisplay>) {
    init_logging();
    let canvas = HeadlessCanvas::new(1, client);
    let display = HeadlessDisplay::new(ratio);
    let pool = LocalPool::new();
    let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display.clone())
        .options(BindingOptions::pixel_density_only())
        .build(&pool.spawner())
        .unwrap();
    (binding, canvas, display)
}

/// Everything needed to drive a binding through the capability probe
struct ObserverEnv {
    canvas: Rc<HeadlessCanvas>,
    display: Rc<HeadlessDisplay>,
    host: Rc<HeadlessResizeObserver>,
    timer: Rc<ManualTimer>,
    pool: LocalPool,
}

impl ObserverEnv {
    fn new(mode: ObserverMode, client: Size, ratio: f64) -> Self {
        init_logging();
        Self {
            canvas: HeadlessCanvas::new(7, client),
            display: HeadlessDisplay::new(ratio),
            host: HeadlessResizeObserver::new(mode),
            timer: ManualTimer::new(),
            pool: LocalPool::new(),
        }
    }

    fn build(&self, options: BindingOptions) -> BitmapSizeBinding {
        BitmapSizeBindingBuilder::new(self.canvas.clone(), self.display.clone())
            .options(options)
            .resize_observer(self.host.clone(), self.timer.clone())
            .build(&self.pool.spawner())
            .unwrap()
    }

    /// Run the probe to completion and deliver the first observations
    fn settle(&mut self) {
        self.pool.run_until_stalled();
        self.host.flush();
        self.pool.run_until_stalled();
        self.host.flush();
    }
}

fn record_suggestions(binding: &BitmapSizeBinding) -> SuggestionLog {
    let log: SuggestionLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    binding
        .subscribe_suggested_bitmap_size_changed(move |old, new| sink.borrow_mut().push((old, new)))
        .unwrap();
    log
}

fn record_bitmap_changes(binding: &BitmapSizeBinding) -> BitmapLog {
    let log: BitmapLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    binding
        .subscribe_bitmap_size_changed(move |old, new| sink.borrow_mut().push((old, new)))
        .unwrap();
    log
}

// ============================================================================
// Suggest / Commit Protocol
// ============================================================================

#[test]
fn test_resize_then_apply_commits_suggestion() {
    let canvas_size = Size::new(100, 100);
    let (binding, canvas, _display) = {
        init_logging();
        let canvas = HeadlessCanvas::new(1, canvas_size);
        canvas.set_initial_bitmap(canvas_size);
        let display = HeadlessDisplay::new(1.0);
        let pool = LocalPool::new();
        let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display.clone())
            .options(BindingOptions::pixel_density_only())
            .build(&pool.spawner())
            .unwrap();
        (binding, canvas, display)
    };
    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);

    let suggestions = record_suggestions(&binding);
    let bitmaps = record_bitmap_changes(&binding);

    binding.resize_client_layout(Size::new(200, 150)).unwrap();
    assert_eq!(binding.client_size().unwrap(), Size::new(200, 150));
    assert_eq!(canvas.client_size(), Size::new(200, 150));
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(200, 150)));
    assert_eq!(binding.bitmap_size().unwrap(), canvas_size);

    binding.apply_suggested_bitmap_size().unwrap();
    assert_eq!(binding.bitmap_size().unwrap(), Size::new(200, 150));
    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);

    assert_eq!(
        suggestions.borrow().as_slice(),
        &[
            (None, Some(Size::new(200, 150))),
            (Some(Size::new(200, 150)), None),
        ]
    );
    assert_eq!(bitmaps.borrow().as_slice(), &[(canvas_size, Size::new(200, 150))]);
}

#[test]
fn test_end_to_end_ratio_two() {
    let (binding, canvas, _display) = density_binding(Size::new(300, 200), 2.0);

    assert_eq!(binding.strategy(), Strategy::PixelDensity);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(600, 400)));

    binding.apply_suggested_bitmap_size().unwrap();
    assert_eq!(binding.bitmap_size().unwrap(), Size::new(600, 400));
    assert_eq!(canvas.bitmap_resize_count(), 1);
}

#[test]
fn test_apply_without_suggestion_is_noop() {
    let (binding, canvas, _display) = density_binding(Size::new(300, 150), 1.0);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);

    let suggestions = record_suggestions(&binding);
    let bitmaps = record_bitmap_changes(&binding);
    binding.apply_suggested_bitmap_size().unwrap();

    assert!(suggestions.borrow().is_empty());
    assert!(bitmaps.borrow().is_empty());
    assert_eq!(canvas.bitmap_resize_count(), 0);
}

#[test]
fn test_same_candidate_notifies_once() {
    let (binding, _canvas, _display) = density_binding(Size::new(100, 100), 1.0);
    binding.apply_suggested_bitmap_size().unwrap();
    let suggestions = record_suggestions(&binding);

    binding.resize_client_layout(Size::new(200, 150)).unwrap();
    binding.resize_client_layout(Size::new(200, 150)).unwrap();

    assert_eq!(suggestions.borrow().len(), 1);
}

#[test]
fn test_candidate_equal_to_bitmap_creates_no_suggestion() {
    let (binding, _canvas, _display) = density_binding(Size::new(300, 150), 1.0);
    let suggestions = record_suggestions(&binding);

    binding.resize_client_layout(Size::new(300, 150)).unwrap();

    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);
    assert!(suggestions.borrow().is_empty());
}

#[test]
fn test_returning_to_bitmap_size_clears_suggestion() {
    let (binding, _canvas, _display) = density_binding(Size::new(300, 150), 1.0);
    let suggestions = record_suggestions(&binding);

    binding.resize_client_layout(Size::new(400, 300)).unwrap();
    binding.resize_client_layout(Size::new(300, 150)).unwrap();

    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);
    assert_eq!(
        suggestions.borrow().as_slice(),
        &[
            (None, Some(Size::new(400, 300))),
            (Some(Size::new(400, 300)), None),
        ]
    );
}

#[test]
fn test_redundant_backing_store_resize_suppressed() {
    let (binding, canvas, _display) = density_binding(Size::new(300, 200), 1.0);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(300, 200)));

    // Someone else already brought the backing store to the suggested size
    canvas.set_initial_bitmap(Size::new(300, 200));
    let suggestions = record_suggestions(&binding);
    let bitmaps = record_bitmap_changes(&binding);

    binding.apply_suggested_bitmap_size().unwrap();

    assert_eq!(canvas.bitmap_resize_count(), 0);
    assert!(bitmaps.borrow().is_empty());
    assert_eq!(suggestions.borrow().as_slice(), &[(Some(Size::new(300, 200)), None)]);
}

#[test]
fn test_apply_from_inside_suggestion_listener() {
    let (binding, canvas, _display) = density_binding(Size::new(300, 150), 1.0);
    let weak = binding.downgrade();
    binding
        .subscribe_suggested_bitmap_size_changed(move |_, new| {
            if new.is_some() {
                if let Some(binding) = weak.upgrade() {
                    binding.apply_suggested_bitmap_size().unwrap();
                }
            }
        })
        .unwrap();
    let suggestions = record_suggestions(&binding);

    binding.resize_client_layout(Size::new(320, 240)).unwrap();

    assert_eq!(canvas.bitmap_size(), Size::new(320, 240));
    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);
    assert_eq!(suggestions.borrow().len(), 2);
}

#[test]
fn test_commit_reports_suggestion_made_during_commit() {
    let (binding, _canvas, _display) = density_binding(Size::new(300, 200), 1.0);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(300, 200)));

    let weak = binding.downgrade();
    let resized = Rc::new(Cell::new(false));
    let once = Rc::clone(&resized);
    binding
        .subscribe_bitmap_size_changed(move |_, _| {
            if once.replace(true) {
                return;
            }
            if let Some(binding) = weak.upgrade() {
                binding.resize_client_layout(Size::new(400, 300)).unwrap();
            }
        })
        .unwrap();
    let suggestions = record_suggestions(&binding);

    binding.apply_suggested_bitmap_size().unwrap();

    let pending = binding.suggested_bitmap_size().unwrap();
    assert_eq!(pending, Some(Size::new(400, 300)));
    assert_eq!(
        suggestions.borrow().as_slice(),
        &[
            (None, Some(Size::new(400, 300))),
            (Some(Size::new(300, 200)), Some(Size::new(400, 300))),
        ]
    );
    assert_eq!(suggestions.borrow().last().map(|(_, new)| *new), Some(pending));
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let (binding, _canvas, _display) = density_binding(Size::new(300, 150), 1.0);
    let log: SuggestionLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let id = binding
        .subscribe_suggested_bitmap_size_changed(move |old, new| sink.borrow_mut().push((old, new)))
        .unwrap();

    assert!(binding.unsubscribe_suggested_bitmap_size_changed(id));
    assert!(!binding.unsubscribe_suggested_bitmap_size_changed(id));

    binding.resize_client_layout(Size::new(10, 10)).unwrap();
    assert!(log.borrow().is_empty());
}

// ============================================================================
// Pixel Density Strategy
// ============================================================================

#[test]
fn test_ratio_changes_produce_suggestions() {
    let (binding, _canvas, display) = density_binding(Size::new(300, 200), 1.0);
    binding.apply_suggested_bitmap_size().unwrap();
    let suggestions = record_suggestions(&binding);

    display.set_device_pixel_ratio(2.0);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(600, 400)));
    assert_eq!(display.listener_count(), 1);

    // The listener was re-registered at 2.0, so 3.0 is still observed
    display.set_device_pixel_ratio(3.0);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(900, 600)));
    assert_eq!(display.listener_count(), 1);

    assert_eq!(suggestions.borrow().len(), 2);
}

#[test]
fn test_fractional_origin_snaps_edges() {
    init_logging();
    let canvas = HeadlessCanvas::new(1, Size::new(3, 4));
    canvas.set_origin(0.5, 0.0);
    let display = HeadlessDisplay::new(1.5);
    let pool = LocalPool::new();
    let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display)
        .options(BindingOptions::pixel_density_only())
        .build(&pool.spawner())
        .unwrap();

    // Left edge 0.75 -> 1, right edge 5.25 -> 5
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(4, 6)));
}

#[test]
fn test_missing_layout_box_scales_client_size() {
    init_logging();
    let canvas = HeadlessCanvas::new(1, Size::new(3, 4));
    canvas.set_laid_out(false);
    let display = HeadlessDisplay::new(1.5);
    let pool = LocalPool::new();
    let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display)
        .options(BindingOptions::pixel_density_only())
        .build(&pool.spawner())
        .unwrap();

    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(5, 6)));
}

#[test]
fn test_transform_receives_client_size() {
    init_logging();
    let canvas = HeadlessCanvas::new(1, Size::new(101, 33));
    let display = HeadlessDisplay::new(1.5);
    let pool = LocalPool::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display)
        .options(BindingOptions::pixel_density_only())
        .transform(move |raw, client| {
            sink.borrow_mut().push((raw, client));
            Size::new(raw.width.min(128), raw.height.min(128))
        })
        .build(&pool.spawner())
        .unwrap();

    assert_eq!(seen.borrow().as_slice(), &[(Size::new(152, 50), Size::new(101, 33))]);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(128, 50)));
}

#[test]
fn test_bind_to_device_pixel_content_box() {
    init_logging();
    let canvas = HeadlessCanvas::new(1, Size::new(50, 50));
    let display = HeadlessDisplay::new(2.0);
    let pool = LocalPool::new();

    let binding = bind_to(
        canvas.clone(),
        display,
        BindingTarget::DevicePixelContentBox {
            transform: Some(Rc::new(|raw: Size, _client: Size| {
                Size::new(raw.width / 2, raw.height / 2)
            })),
            options: BindingOptions::pixel_density_only(),
        },
    )
    .build(&pool.spawner())
    .unwrap();

    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(50, 50)));
}

// ============================================================================
// Resize Observer Strategy
// ============================================================================

#[test]
fn test_supported_host_uses_resize_observer() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 2.0);
    env.host.resize(ElementId(7), Size::new(601, 399));
    let binding = env.build(BindingOptions::default());
    assert_eq!(binding.strategy(), Strategy::Pending);

    env.settle();

    assert_eq!(binding.strategy(), Strategy::ResizeObserver);
    // Device pixel box is taken as is, not predicted from the ratio
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(601, 399)));
    assert_eq!(env.host.active_observation_count(), 1);
    assert_eq!(env.display.listener_count(), 0);
}

#[test]
fn test_single_pass_leaves_probe_unresolved() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 2.0);
    env.host.resize(ElementId(7), Size::new(600, 400));
    let binding = env.build(BindingOptions::default());

    env.pool.run_until_stalled();
    env.host.flush();
    assert_eq!(binding.strategy(), Strategy::Pending);

    let host = Rc::clone(&env.host);
    run_until_quiescent(&mut env.pool, || host.flush());

    assert_eq!(binding.strategy(), Strategy::ResizeObserver);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(600, 400)));
    assert!(!env.host.flush());
}

#[test]
fn test_resize_entries_drive_suggestions() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 2.0);
    env.host.resize(ElementId(7), Size::new(600, 400));
    let binding = env.build(BindingOptions::default());
    env.settle();
    binding.apply_suggested_bitmap_size().unwrap();
    let suggestions = record_suggestions(&binding);

    env.host.resize(ElementId(7), Size::new(640, 480));
    env.host.flush();
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(640, 480)));

    env.host.resize(ElementId(7), Size::new(640, 480));
    env.host.flush();
    assert_eq!(suggestions.borrow().len(), 1);
}

#[test]
fn test_irrelevant_entries_are_ignored() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 150), 1.0);
    env.host.resize(ElementId(7), Size::new(300, 150));
    let binding = env.build(BindingOptions::default());
    env.settle();
    assert_eq!(binding.strategy(), Strategy::ResizeObserver);
    let suggestions = record_suggestions(&binding);

    env.host.deliver_to_all(&[ResizeEntry::with_device_pixels(ElementId(99), 10, 10)]);
    env.host.deliver_to_all(&[ResizeEntry::without_device_pixels(ElementId(7))]);
    env.host.deliver_to_all(&[ResizeEntry {
        target: ElementId(7),
        device_pixel_content_box_size: Some(Vec::new()),
    }]);

    assert!(suggestions.borrow().is_empty());
    assert_eq!(binding.suggested_bitmap_size().unwrap(), None);
}

#[test]
fn test_layout_change_during_probe_is_not_lost() {
    let env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 150), 2.0);
    let binding = env.build(BindingOptions::default());
    assert_eq!(binding.strategy(), Strategy::Pending);

    binding.resize_client_layout(Size::new(320, 240)).unwrap();

    assert_eq!(binding.client_size().unwrap(), Size::new(320, 240));
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(640, 480)));
}

#[test]
fn test_unsupported_host_falls_back_to_pixel_density() {
    let mut env = ObserverEnv::new(ObserverMode::Unsupported, Size::new(300, 200), 2.0);
    let binding = env.build(BindingOptions::default());

    env.settle();

    assert_eq!(binding.strategy(), Strategy::PixelDensity);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(600, 400)));
    assert_eq!(env.host.active_observation_count(), 0);
    assert_eq!(env.display.listener_count(), 1);
}

#[test]
fn test_failing_host_falls_back_to_pixel_density() {
    let mut env = ObserverEnv::new(ObserverMode::Failing, Size::new(300, 200), 1.0);
    let binding = env.build(BindingOptions::default());

    env.pool.run_until_stalled();

    assert_eq!(binding.strategy(), Strategy::PixelDensity);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(300, 200)));
}

#[test]
fn test_silent_host_times_out_to_pixel_density() {
    let mut env = ObserverEnv::new(ObserverMode::Silent, Size::new(300, 200), 2.0);
    let binding = env.build(BindingOptions { allow_resize_observer: true, probe_timeout_ms: 100 });

    env.settle();
    assert_eq!(binding.strategy(), Strategy::Pending);

    env.timer.advance(Duration::from_millis(100));
    env.pool.run_until_stalled();

    assert_eq!(binding.strategy(), Strategy::PixelDensity);
    assert_eq!(binding.suggested_bitmap_size().unwrap(), Some(Size::new(600, 400)));
}

#[test]
fn test_disallowed_resize_observer_never_probes() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 1.0);
    let binding = env.build(BindingOptions::pixel_density_only());

    assert_eq!(binding.strategy(), Strategy::PixelDensity);
    env.settle();
    assert_eq!(env.host.observe_call_count(), 0);
    assert_eq!(binding.strategy(), Strategy::PixelDensity);
}

#[test]
fn test_probe_resolving_after_dispose_is_ignored() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 1.0);
    let binding = env.build(BindingOptions::default());
    env.pool.run_until_stalled();

    binding.dispose().unwrap();
    env.settle();

    assert_eq!(env.host.observe_call_count(), 1);
    assert_eq!(env.host.active_observation_count(), 0);
    assert_eq!(env.display.listener_count(), 0);
}

#[test]
fn test_probe_resolving_after_drop_is_ignored() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 1.0);
    drop(env.build(BindingOptions::default()));

    env.settle();

    assert_eq!(env.host.observe_call_count(), 1);
    assert_eq!(env.host.active_observation_count(), 0);
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_accessors_fail_after_dispose() {
    let (binding, _canvas, display) = density_binding(Size::new(300, 200), 1.0);
    binding.dispose().unwrap();

    assert!(binding.is_disposed());
    assert!(matches!(binding.canvas_element(), Err(Error::Disposed)));
    assert!(matches!(binding.client_size(), Err(Error::Disposed)));
    assert!(matches!(binding.bitmap_size(), Err(Error::Disposed)));
    assert!(matches!(binding.suggested_bitmap_size(), Err(Error::Disposed)));
    assert!(matches!(binding.resize_client_layout(Size::new(1, 1)), Err(Error::Disposed)));
    assert!(matches!(binding.apply_suggested_bitmap_size(), Err(Error::Disposed)));
    assert!(matches!(binding.subscribe_bitmap_size_changed(|_, _| {}), Err(Error::Disposed)));
    assert!(matches!(
        binding.subscribe_suggested_bitmap_size_changed(|_, _| {}),
        Err(Error::Disposed)
    ));
    assert!(matches!(binding.dispose(), Err(Error::Disposed)));
    assert_eq!(display.listener_count(), 0);
}

#[test]
fn test_dispose_stops_signal_delivery() {
    let (binding, _canvas, display) = density_binding(Size::new(300, 200), 1.0);
    let suggestions = record_suggestions(&binding);
    binding.dispose().unwrap();

    display.set_device_pixel_ratio(2.0);
    assert!(suggestions.borrow().is_empty());
}

#[test]
fn test_dispose_disconnects_resize_observer() {
    let mut env = ObserverEnv::new(ObserverMode::Supported, Size::new(300, 200), 1.0);
    let binding = env.build(BindingOptions::default());
    env.settle();
    assert_eq!(env.host.active_observation_count(), 1);

    binding.dispose().unwrap();
    assert_eq!(env.host.active_observation_count(), 0);
}

#[test]
fn test_dropping_binding_releases_listener() {
    let (binding, _canvas, display) = density_binding(Size::new(300, 200), 1.0);
    assert_eq!(display.listener_count(), 1);

    drop(binding);
    assert_eq!(display.listener_count(), 0);
}
