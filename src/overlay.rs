//! overlay.rs - Price annotations and the settings-panel price list
//!
//! Only computes strings and positions; the host's Canvas does the drawing.

use chrono::{DateTime, Local, Utc};
use log::debug;
use rust_decimal::Decimal;

use crate::models::{value_tier, SnapshotSource};
use crate::name_cache::PriceIndex;
use crate::pricing::PricedGroup;
use crate::ui::{walk_bounded, Canvas, Color, Point, Rect, UiNode};

const TOTAL_MARGIN: f32 = 5.0;
const PRICE_MARGIN: f32 = 5.0;

pub fn total_text(total: Decimal) -> String {
    format!("Total: {:.2} exalts", total)
}

pub fn price_text(price: Decimal) -> String {
    format!("{:.2}ex", price)
}

/// Draw the group total above `label` and a price next to every priced row.
/// Returns the number of row prices drawn.
pub fn draw_group(canvas: &mut dyn Canvas, label: &dyn UiNode, group: &PricedGroup) -> usize {
    if group.total <= Decimal::ZERO {
        return 0;
    }

    match label.client_rect() {
        Ok(rect) => draw_total(canvas, rect, group.total),
        Err(e) => debug!("Cannot place total: {}", e),
    }

    let mut drawn = 0;
    walk_bounded(label, 3, |element, depth| {
        // The label itself only carries the total
        if depth == 1 {
            return true;
        }
        let Some(price) = element.text().and_then(|text| group.price_of(&text)) else {
            return true;
        };
        if let Ok(rect) = element.client_rect() {
            draw_price(canvas, rect, price);
            drawn += 1;
        }
        true
    });
    drawn
}

fn draw_total(canvas: &mut dyn Canvas, label_rect: Rect, total: Decimal) {
    let text = total_text(total);
    let size = canvas.measure_text(&text);
    let at = Point::new(
        label_rect.center().x - size.x / 2.0,
        label_rect.top() - size.y - TOTAL_MARGIN,
    );
    canvas.draw_box(Rect::new(at.x - 5.0, at.y - 2.0, size.x + 10.0, size.y + 4.0), Color::backdrop(200));
    canvas.draw_text(&text, at, Color::GOLD);
}

fn draw_price(canvas: &mut dyn Canvas, element_rect: Rect, price: Decimal) {
    let text = price_text(price);
    let size = canvas.measure_text(&text);
    let at = Point::new(
        element_rect.right() + PRICE_MARGIN,
        element_rect.center().y - size.y / 2.0,
    );
    canvas.draw_box(Rect::new(at.x - 3.0, at.y - 2.0, size.x + 6.0, size.y + 4.0), Color::backdrop(180));
    canvas.draw_text(&text, at, Color::LIME);
}

/// One row of the price list
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub name: String,
    pub price: String,
    pub tier: u8,
}

/// Cached prices, highest first, formatted for display
pub fn price_rows(index: &PriceIndex) -> Vec<PriceRow> {
    index
        .sorted_by_price()
        .into_iter()
        .map(|entry| PriceRow {
            name: entry.name.clone(),
            price: format!("{:.3}", entry.price),
            tier: value_tier(entry.price),
        })
        .collect()
}

pub fn last_update_text(last: Option<DateTime<Utc>>) -> String {
    match last {
        Some(at) => format!("Last updated: {}", at.with_timezone(&Local).format("%H:%M:%S")),
        None => "Never updated".to_string(),
    }
}

pub fn data_source_text(source: SnapshotSource) -> String {
    format!("Data source: {}", source)
}
