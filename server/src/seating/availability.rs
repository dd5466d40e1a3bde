use std::collections::HashSet;

use super::layout::SeatLayout;

/// Union of the seats held by a showtime's reservations.
pub fn committed_seats<'a, I>(reservations: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    reservations
        .into_iter()
        .flat_map(|seats| seats.iter().cloned())
        .collect()
}

/// Seats of the layout for `capacity` that are not in `committed`, in layout order.
pub fn available_seats(layout: &SeatLayout, capacity: i32, committed: &HashSet<String>) -> Vec<String> {
    layout
        .seats(capacity)
        .into_iter()
        .filter(|seat| !committed.contains(seat))
        .collect()
}
