//! detector.rs - Finds essences inside visible monolith labels
//!
//! Runs once per tick. Buffers are owned by the detector and reused between
//! ticks; the results borrow them and must not outlive the tick.

use log::debug;
use std::collections::HashSet;

use crate::ui::{walk_bounded, GroundLabel, Point};

/// Substring of the backing entity metadata that marks a monolith
pub const ROOT_METADATA_MARKER: &str = "Monolith";

/// Case-insensitive text marker for essence names
pub const ENTITY_TEXT_MARKER: &str = "essence";

/// Label, child, grandchild
pub const DETECTION_DEPTH: usize = 3;

/// Index of a label in the tick's visible-label slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelRef(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEntity {
    pub label: LabelRef,
    pub name: String,
    pub position: Point,
    pub distance: Option<f32>,
}

/// Entities that share a screen position, i.e. one monolith
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGroup {
    pub label: LabelRef,
    pub position: Point,
    pub distance: Option<f32>,
    pub names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntityDetector {
    entities: Vec<DetectedEntity>,
    seen: HashSet<(String, (u32, u32))>,
}

impl EntityDetector {
    pub fn new() -> Self {
        EntityDetector::default()
    }

    /// Scan `labels` and return this tick's de-duplicated entities
    pub fn detect<L: GroundLabel>(&mut self, labels: &[L]) -> &[DetectedEntity] {
        self.entities.clear();
        self.seen.clear();

        for (index, label) in labels.iter().enumerate() {
            let is_root = label
                .entity_metadata()
                .map(|metadata| metadata.contains(ROOT_METADATA_MARKER))
                .unwrap_or(false);
            if !is_root {
                continue;
            }

            let Some(node) = label.label() else {
                continue;
            };
            let position = match node.client_rect() {
                Ok(rect) => rect.center(),
                Err(e) => {
                    debug!("Skipping label {}: {}", index, e);
                    continue;
                }
            };
            let distance = label.entity_distance();

            let entities = &mut self.entities;
            let seen = &mut self.seen;
            walk_bounded(node, DETECTION_DEPTH, |element, _| {
                if let Some(text) = element.text() {
                    if is_entity_text(&text) && seen.insert((text.clone(), position.key())) {
                        entities.push(DetectedEntity {
                            label: LabelRef(index),
                            name: text,
                            position,
                            distance,
                        });
                    }
                }
                true
            });
        }

        &self.entities
    }

    pub fn entities(&self) -> &[DetectedEntity] {
        &self.entities
    }

    /// Group the current entities by screen position, in detection order
    pub fn groups(&self) -> Vec<EntityGroup> {
        group_by_position(&self.entities)
    }
}

pub fn is_entity_text(text: &str) -> bool {
    !text.is_empty() && text.to_lowercase().contains(ENTITY_TEXT_MARKER)
}

pub fn group_by_position(entities: &[DetectedEntity]) -> Vec<EntityGroup> {
    let mut groups: Vec<EntityGroup> = Vec::new();
    for entity in entities {
        match groups.iter_mut().find(|group| group.position == entity.position) {
            Some(group) => group.names.push(entity.name.clone()),
            None => groups.push(EntityGroup {
                label: entity.label,
                position: entity.position,
                distance: entity.distance,
                names: vec![entity.name.clone()],
            }),
        }
    }
    groups
}
