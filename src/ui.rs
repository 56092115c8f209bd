//! ui.rs - Contracts for the host's game-state, input and drawing layers
//!
//! The host adapts its own label tree, cursor control and overlay renderer to
//! these traits. Everything here is only valid for the tick that produced it.

use crate::error::PricerResult;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn offset(&self, by: Point) -> Point {
        Point::new(self.x + by.x, self.y + by.y)
    }

    /// Bitwise key for hashing exact positions
    pub fn key(&self) -> (u32, u32) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const GOLD: Color = Color { r: 255, g: 215, b: 0, a: 255 };
    pub const LIME: Color = Color { r: 0, g: 255, b: 0, a: 255 };

    pub const fn backdrop(alpha: u8) -> Color {
        Color { r: 0, g: 0, b: 0, a: alpha }
    }
}

/// One element of the on-screen label tree
pub trait UiNode {
    /// Displayed text, if the element has any
    fn text(&self) -> Option<String>;

    /// Direct children
    fn children(&self) -> PricerResult<Vec<&dyn UiNode>>;

    /// Element rectangle in window coordinates
    fn client_rect(&self) -> PricerResult<Rect>;

    /// Texture resource path for image elements
    fn texture(&self) -> Option<String> {
        None
    }
}

/// A visible ground label and the world entity behind it
pub trait GroundLabel {
    /// Metadata path of the backing entity
    fn entity_metadata(&self) -> Option<String>;

    fn label(&self) -> Option<&dyn UiNode>;

    /// Distance from the player to the backing entity
    fn entity_distance(&self) -> Option<f32>;
}

pub trait Pointer {
    fn position(&self) -> PricerResult<Point>;
    fn move_to(&mut self, to: Point) -> PricerResult<()>;
    fn press(&mut self) -> PricerResult<()>;
    fn release(&mut self) -> PricerResult<()>;
}

pub trait Canvas {
    /// Rendered size of `text` as (width, height)
    fn measure_text(&self, text: &str) -> Point;
    fn draw_box(&mut self, rect: Rect, color: Color);
    fn draw_text(&mut self, text: &str, at: Point, color: Color);
}

/// Pre-order walk of `root` down to `max_depth` levels (the root is level 1).
///
/// `visit` returns `false` to stop the walk. Nodes whose children cannot be
/// read are visited but not descended into; their siblings are still walked.
pub fn walk_bounded<'a, F>(root: &'a dyn UiNode, max_depth: usize, mut visit: F)
where
    F: FnMut(&'a dyn UiNode, usize) -> bool,
{
    if max_depth == 0 {
        return;
    }
    let mut stack: Vec<(&'a dyn UiNode, usize)> = vec![(root, 1)];

    while let Some((node, depth)) = stack.pop() {
        if !visit(node, depth) {
            return;
        }
        if depth >= max_depth {
            continue;
        }
        match node.children() {
            Ok(children) => {
                // Reverse so the first child is visited first
                stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            }
            Err(e) => log::debug!("Skipping unreadable subtree: {}", e),
        }
    }
}
