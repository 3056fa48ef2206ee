use nalgebra::Point3;

use crate::track::GridLayout;

// ---------------------------------------------
// SPAWN RESULT RETURNED TO THE SESSION
// ---------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSlot {
    pub slot: usize,
    pub position: Point3<f32>,
}

// ---------------------------------------------
// START GRID: two staggered columns, rows going back along +Z
// ---------------------------------------------
#[derive(Debug)]
pub struct SpawnGrid {
    layout: GridLayout,
    next_slot: usize,
}

impl SpawnGrid {
    pub fn new(layout: GridLayout) -> Self {
        Self { layout, next_slot: 0 }
    }

    // ---------------------------------------------------------
    // Slot position: even slots on the left column, odd on the right
    // ---------------------------------------------------------
    fn slot_position(&self, slot: usize) -> Point3<f32> {
        let [ox, oy, oz] = self.layout.origin;
        let row = (slot / 2) as f32;
        let side = if slot % 2 == 0 { -0.5 } else { 0.5 };
        let stagger = if slot % 2 == 0 { 0.0 } else { self.layout.row_gap * 0.5 };

        Point3::new(
            ox + side * self.layout.column_gap,
            oy,
            oz + row * self.layout.row_gap + stagger,
        )
    }

    /// Next free slot, without taking it
    pub fn peek(&self) -> SpawnSlot {
        SpawnSlot {
            slot: self.next_slot,
            position: self.slot_position(self.next_slot),
        }
    }

    pub fn allocate(&mut self) -> SpawnSlot {
        let slot = self.peek();
        self.next_slot += 1;
        slot
    }
}
