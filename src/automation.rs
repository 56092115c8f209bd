//! automation.rs - Guarded auto-corrupt loop
//!
//! ```text
//!  Idle ──debounce elapsed──▶ Armed ──guards pass──▶ Acting ──no marker left──▶ Cooldown
//!   ▲                           │                                                  │
//!   └──────guard rejected───────┘◀──────────────debounce elapsed───────────────────┘
//! ```
//!
//! Once the guards pass the loop runs to completion: every marker found under
//! the target label is clicked once, then the pointer is put back.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::Settings;
use crate::error::PricerResult;
use crate::in_flight::InFlight;
use crate::pricing::PricedGroup;
use crate::ui::{walk_bounded, GroundLabel, Point, Pointer, UiNode};

pub const DEBOUNCE: Duration = Duration::from_millis(50);
pub const ACTION_STEP_DELAY: Duration = Duration::from_millis(30);
pub const MARKER_SEARCH_DEPTH: usize = 6;
/// Upper bound for hosts whose tree does not drop a marker once clicked
pub const MAX_ACTIONS_PER_TARGET: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationState {
    Idle,
    Armed,
    Acting,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationGuardState {
    pub last_action: Option<Instant>,
    pub cooldown: Duration,
    pub max_value: Decimal,
    pub max_distance: f32,
}

impl AutomationGuardState {
    pub fn new(max_value: Decimal, max_distance: f32) -> Self {
        AutomationGuardState {
            last_action: None,
            cooldown: DEBOUNCE,
            max_value,
            max_distance,
        }
    }

    fn debounced(&self, now: Instant) -> bool {
        self.last_action
            .map(|last| now.duration_since(last) < self.cooldown)
            .unwrap_or(false)
    }
}

/// Why the loop did not act this tick
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardRejection {
    #[error("no groups detected")]
    NoGroups,

    #[error("no detected group has a known price")]
    Unpriced,

    #[error("nearest group has no known distance")]
    UnknownDistance,

    #[error("nearest group is {distance} away (limit {max})")]
    TooFar { distance: f32, max: f32 },

    #[error("group is worth {value} (limit {max})")]
    TooValuable { value: Decimal, max: Decimal },

    #[error("target label is no longer visible")]
    TargetUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutomationOutcome {
    Disabled,
    Busy,
    Debouncing,
    Rejected(GuardRejection),
    Completed { actions: usize },
}

/// Pick the nearest priced group and check it against the thresholds.
///
/// Groups without a single matched price are never candidates: their zero
/// total says nothing about their worth.
pub fn evaluate_guards<'g>(
    groups: &'g [PricedGroup],
    guard: &AutomationGuardState,
) -> Result<&'g PricedGroup, GuardRejection> {
    if groups.is_empty() {
        return Err(GuardRejection::NoGroups);
    }
    let nearest = groups
        .iter()
        .filter(|g| !g.prices.is_empty())
        .min_by(|a, b| {
            let a = a.group.distance.unwrap_or(f32::INFINITY);
            let b = b.group.distance.unwrap_or(f32::INFINITY);
            a.total_cmp(&b)
        })
        .ok_or(GuardRejection::Unpriced)?;

    let distance = nearest.group.distance.ok_or(GuardRejection::UnknownDistance)?;
    if distance > guard.max_distance {
        return Err(GuardRejection::TooFar {
            distance,
            max: guard.max_distance,
        });
    }
    if nearest.total > guard.max_value {
        return Err(GuardRejection::TooValuable {
            value: nearest.total,
            max: guard.max_value,
        });
    }
    Ok(nearest)
}

/// Screen-space centre of the first marker node under `target`
pub fn find_marker(target: &dyn UiNode, marker: &str) -> Option<Point> {
    let mut found = None;
    walk_bounded(target, MARKER_SEARCH_DEPTH, |node, _| {
        if node.texture().as_deref() != Some(marker) {
            return true;
        }
        match node.client_rect() {
            Ok(rect) => {
                found = Some(rect.center());
                false
            }
            Err(e) => {
                debug!("Marker without readable rect: {}", e);
                true
            }
        }
    });
    found
}

pub struct AutomationLoop {
    state: AutomationState,
    guard: AutomationGuardState,
    restore_pointer: bool,
    marker: String,
    in_flight: InFlight,
}

impl AutomationLoop {
    pub fn new(settings: &Settings) -> Self {
        AutomationLoop {
            state: AutomationState::Idle,
            guard: AutomationGuardState::new(
                settings.max_price_to_auto_corrupt,
                settings.max_distance_to_auto_corrupt,
            ),
            restore_pointer: settings.restore_pointer_position,
            marker: settings.marker_texture.clone(),
            in_flight: InFlight::new(),
        }
    }

    /// Pick up changed thresholds without losing the debounce timer
    pub fn configure(&mut self, settings: &Settings) {
        self.guard.max_value = settings.max_price_to_auto_corrupt;
        self.guard.max_distance = settings.max_distance_to_auto_corrupt;
        self.restore_pointer = settings.restore_pointer_position;
        self.marker.clone_from(&settings.marker_texture);
    }

    pub fn state(&self) -> AutomationState {
        self.state
    }

    pub fn guard_state(&self) -> &AutomationGuardState {
        &self.guard
    }

    /// Flag observed by the host while a loop is running
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Evaluate one tick; acts on the nearest group when every guard passes
    pub async fn tick<L: GroundLabel>(
        &mut self,
        enabled: bool,
        groups: &[PricedGroup],
        labels: &[L],
        window_origin: Point,
        pointer: &mut dyn Pointer,
    ) -> AutomationOutcome {
        if !enabled {
            return AutomationOutcome::Disabled;
        }
        let Some(_running) = self.in_flight.try_begin() else {
            return AutomationOutcome::Busy;
        };
        if self.guard.debounced(Instant::now()) {
            return AutomationOutcome::Debouncing;
        }
        if self.state == AutomationState::Cooldown {
            self.state = AutomationState::Idle;
        }

        self.state = AutomationState::Armed;
        let target = match evaluate_guards(groups, &self.guard) {
            Ok(group) => group,
            Err(rejection) => {
                debug!("Auto corrupt skipped: {}", rejection);
                self.state = AutomationState::Idle;
                return AutomationOutcome::Rejected(rejection);
            }
        };
        let Some(node) = labels.get(target.group.label.0).and_then(|label| label.label()) else {
            self.state = AutomationState::Idle;
            return AutomationOutcome::Rejected(GuardRejection::TargetUnavailable);
        };

        self.state = AutomationState::Acting;
        let actions = self.act(node, window_origin, pointer).await;

        self.guard.last_action = Some(Instant::now());
        self.state = AutomationState::Cooldown;
        if actions > 0 {
            info!(
                "Auto corrupt applied {} time(s) to group worth {:.2}ex",
                actions, target.total
            );
        }
        AutomationOutcome::Completed { actions }
    }

    async fn act(&self, target: &dyn UiNode, window_origin: Point, pointer: &mut dyn Pointer) -> usize {
        let restore_to = if self.restore_pointer {
            match pointer.position() {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("Could not read pointer position: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut actions = 0;
        while actions < MAX_ACTIONS_PER_TARGET {
            let Some(center) = find_marker(target, &self.marker) else {
                break;
            };
            if let Err(e) = click(pointer, center.offset(window_origin)).await {
                warn!("Auto corrupt click failed: {}", e);
            }
            actions += 1;
        }
        if actions == MAX_ACTIONS_PER_TARGET {
            warn!("Marker still present after {} clicks, giving up", actions);
        }

        if let Some(position) = restore_to {
            if let Err(e) = pointer.move_to(position) {
                warn!("Could not restore pointer position: {}", e);
            }
        }
        actions
    }
}

async fn click(pointer: &mut dyn Pointer, at: Point) -> PricerResult<()> {
    pointer.move_to(at)?;
    time::sleep(ACTION_STEP_DELAY).await;
    pointer.press()?;
    time::sleep(ACTION_STEP_DELAY).await;
    // Always try to release once pressed
    let released = pointer.release();
    time::sleep(ACTION_STEP_DELAY).await;
    released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{EntityGroup, LabelRef};
    use crate::error::PricerError;
    use crate::ui::tests::MockNode;
    use crate::ui::Rect;
    use rust_decimal_macros::dec;
    use std::cell::Cell;
    use std::rc::Rc;

    const MARKER: &str = "Art/Test/CorruptButton";

    #[derive(Debug, Clone, PartialEq)]
    enum Input {
        Move(Point),
        Press,
        Release,
    }

    struct MockPointer {
        position: Point,
        events: Vec<Input>,
        /// Markers left on the monolith; a release consumes one
        charges: Option<Rc<Cell<u32>>>,
        fail_press: bool,
    }

    impl MockPointer {
        fn new(charges: Option<Rc<Cell<u32>>>) -> Self {
            MockPointer { position: Point::new(5.0, 5.0), events: Vec::new(), charges, fail_press: false }
        }

        fn presses(&self) -> usize {
            self.events.iter().filter(|e| **e == Input::Press).count()
        }
    }

    impl Pointer for MockPointer {
        fn position(&self) -> PricerResult<Point> {
            Ok(self.position)
        }

        fn move_to(&mut self, to: Point) -> PricerResult<()> {
            self.position = to;
            self.events.push(Input::Move(to));
            Ok(())
        }

        fn press(&mut self) -> PricerResult<()> {
            if self.fail_press {
                return Err(PricerError::Input("press rejected".to_string()));
            }
            self.events.push(Input::Press);
            Ok(())
        }

        fn release(&mut self) -> PricerResult<()> {
            self.events.push(Input::Release);
            if let Some(charges) = &self.charges {
                charges.set(charges.get().saturating_sub(1));
            }
            Ok(())
        }
    }

    /// Monolith label whose marker disappears once its charges are used
    struct Monolith {
        rect: Rect,
        button: MockNode,
        charges: Rc<Cell<u32>>,
    }

    impl Monolith {
        fn new(charges: u32) -> Self {
            let mut button = MockNode::labeled("").at(Rect::new(100.0, 200.0, 20.0, 10.0));
            button.texture = Some(MARKER.to_string());
            Monolith { rect: Rect::new(80.0, 180.0, 200.0, 60.0), button, charges: Rc::new(Cell::new(charges)) }
        }
    }

    impl UiNode for Monolith {
        fn text(&self) -> Option<String> {
            None
        }

        fn children(&self) -> PricerResult<Vec<&dyn UiNode>> {
            if self.charges.get() > 0 {
                Ok(vec![&self.button as &dyn UiNode])
            } else {
                Ok(Vec::new())
            }
        }

        fn client_rect(&self) -> PricerResult<Rect> {
            Ok(self.rect)
        }
    }

    impl GroundLabel for Monolith {
        fn entity_metadata(&self) -> Option<String> {
            Some("Metadata/Monolith".to_string())
        }

        fn label(&self) -> Option<&dyn UiNode> {
            Some(self)
        }

        fn entity_distance(&self) -> Option<f32> {
            Some(10.0)
        }
    }

    fn group(label: usize, distance: Option<f32>, total: Decimal) -> PricedGroup {
        PricedGroup {
            group: EntityGroup {
                label: LabelRef(label),
                position: Point::new(label as f32, 0.0),
                distance,
                names: vec!["Essence of Ice".to_string()],
            },
            prices: vec![("Essence of Ice".to_string(), total)],
            total,
        }
    }

    fn settings(max_price: Decimal, max_distance: f32) -> Settings {
        Settings {
            max_price_to_auto_corrupt: max_price,
            max_distance_to_auto_corrupt: max_distance,
            marker_texture: MARKER.to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_distance_guard_is_inclusive() {
        let guard = AutomationGuardState::new(dec!(100), 40.0);

        assert!(evaluate_guards(&[group(0, Some(40.0), dec!(1))], &guard).is_ok());
        assert_eq!(
            evaluate_guards(&[group(0, Some(41.0), dec!(1))], &guard),
            Err(GuardRejection::TooFar { distance: 41.0, max: 40.0 })
        );
    }

    #[test]
    fn test_guards_pick_nearest_group() {
        let guard = AutomationGuardState::new(dec!(10), 50.0);
        let groups = vec![
            group(0, Some(30.0), dec!(5)),
            group(1, None, dec!(1)),
            group(2, Some(12.0), dec!(50)),
        ];

        assert_eq!(
            evaluate_guards(&groups, &guard),
            Err(GuardRejection::TooValuable { value: dec!(50), max: dec!(10) })
        );
        assert_eq!(evaluate_guards(&[], &guard), Err(GuardRejection::NoGroups));
        assert_eq!(
            evaluate_guards(&[group(0, None, dec!(1))], &guard),
            Err(GuardRejection::UnknownDistance)
        );
    }

    #[test]
    fn test_price_guard_is_inclusive() {
        let guard = AutomationGuardState::new(dec!(10), 50.0);
        assert!(evaluate_guards(&[group(0, Some(1.0), dec!(10))], &guard).is_ok());
        assert!(evaluate_guards(&[group(0, Some(1.0), dec!(10.01))], &guard).is_err());
    }

    #[test]
    fn test_unpriced_groups_are_never_targets() {
        let guard = AutomationGuardState::new(dec!(5), 50.0);
        let mut unpriced = group(0, Some(1.0), Decimal::ZERO);
        unpriced.prices.clear();

        assert_eq!(evaluate_guards(&[unpriced.clone()], &guard), Err(GuardRejection::Unpriced));

        // A farther priced group is chosen over a nearer unpriced one
        let groups = vec![unpriced, group(1, Some(20.0), dec!(2))];
        assert_eq!(evaluate_guards(&groups, &guard).map(|g| g.group.label), Ok(LabelRef(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acts_until_markers_exhausted_and_restores_pointer() {
        let monolith = Monolith::new(2);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        let labels = vec![monolith];
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        let outcome = automation
            .tick(true, &[group(0, Some(10.0), dec!(3))], &labels, Point::new(1000.0, 500.0), &mut pointer)
            .await;

        assert_eq!(outcome, AutomationOutcome::Completed { actions: 2 });
        assert_eq!(automation.state(), AutomationState::Cooldown);
        assert_eq!(pointer.presses(), 2);
        // Marker centre (110, 205) plus window origin
        assert_eq!(pointer.events[0], Input::Move(Point::new(1110.0, 705.0)));
        assert_eq!(pointer.events.last(), Some(&Input::Move(Point::new(5.0, 5.0))));
        assert_eq!(pointer.position, Point::new(5.0, 5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restore_when_disabled() {
        let monolith = Monolith::new(1);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        let labels = vec![monolith];
        let mut config = settings(dec!(10), 50.0);
        config.restore_pointer_position = false;
        let mut automation = AutomationLoop::new(&config);

        automation
            .tick(true, &[group(0, Some(10.0), dec!(3))], &labels, Point::default(), &mut pointer)
            .await;
        assert_eq!(pointer.position, Point::new(110.0, 205.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_has_no_side_effects() {
        let monolith = Monolith::new(1);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        let labels = vec![monolith];
        let mut automation = AutomationLoop::new(&settings(dec!(1), 50.0));

        let outcome = automation
            .tick(true, &[group(0, Some(10.0), dec!(3))], &labels, Point::default(), &mut pointer)
            .await;

        assert!(matches!(outcome, AutomationOutcome::Rejected(GuardRejection::TooValuable { .. })));
        assert!(pointer.events.is_empty());
        assert_eq!(automation.state(), AutomationState::Idle);
        assert!(automation.guard_state().last_action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_between_activations() {
        let monolith = Monolith::new(1);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        let labels = vec![monolith];
        let groups = vec![group(0, Some(10.0), dec!(3))];
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        automation.tick(true, &groups, &labels, Point::default(), &mut pointer).await;
        let outcome = automation.tick(true, &groups, &labels, Point::default(), &mut pointer).await;
        assert_eq!(outcome, AutomationOutcome::Debouncing);
        assert_eq!(automation.state(), AutomationState::Cooldown);

        time::advance(DEBOUNCE).await;
        let outcome = automation.tick(true, &groups, &labels, Point::default(), &mut pointer).await;
        // Marker already consumed
        assert_eq!(outcome, AutomationOutcome::Completed { actions: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_and_busy_are_no_ops() {
        let monolith = Monolith::new(1);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        let labels = vec![monolith];
        let groups = vec![group(0, Some(10.0), dec!(3))];
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        let outcome = automation.tick(false, &groups, &labels, Point::default(), &mut pointer).await;
        assert_eq!(outcome, AutomationOutcome::Disabled);

        let flag = automation.in_flight();
        assert!(flag.try_claim());
        let outcome = automation.tick(true, &groups, &labels, Point::default(), &mut pointer).await;
        assert_eq!(outcome, AutomationOutcome::Busy);
        assert!(pointer.events.is_empty());
        flag.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_that_never_clears_is_bounded() {
        let monolith = Monolith::new(1);
        // Pointer that does not consume charges
        let mut pointer = MockPointer::new(None);
        let labels = vec![monolith];
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        let outcome = automation
            .tick(true, &[group(0, Some(10.0), dec!(3))], &labels, Point::default(), &mut pointer)
            .await;
        assert_eq!(outcome, AutomationOutcome::Completed { actions: MAX_ACTIONS_PER_TARGET });
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_failure_does_not_abort_loop() {
        let monolith = Monolith::new(3);
        let mut pointer = MockPointer::new(Some(monolith.charges.clone()));
        pointer.fail_press = true;
        let labels = vec![monolith];
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        let outcome = automation
            .tick(true, &[group(0, Some(10.0), dec!(3))], &labels, Point::default(), &mut pointer)
            .await;

        // Every attempt fails before release, so the cap ends the loop
        assert_eq!(outcome, AutomationOutcome::Completed { actions: MAX_ACTIONS_PER_TARGET });
        assert_eq!(pointer.presses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_label_is_rejected() {
        let mut pointer = MockPointer::new(None);
        let labels: Vec<Monolith> = Vec::new();
        let mut automation = AutomationLoop::new(&settings(dec!(10), 50.0));

        let outcome = automation
            .tick(true, &[group(3, Some(10.0), dec!(3))], &labels, Point::default(), &mut pointer)
            .await;
        assert_eq!(outcome, AutomationOutcome::Rejected(GuardRejection::TargetUnavailable));
    }
}
