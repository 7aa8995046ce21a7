use rustc_hash::FxHashMap;

use crate::booking::timeslot::{idx_to_day, min_to_hm, Slot, MINUTES_PER_DAY};


/// A confirmed reservation. The id is what clients quote in CHANGE / CANCEL / EXTEND /
///  QUERY_BOOKING requests; it is unique within the server process.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub facility: String,
    pub slot: Slot,
}


/// A bookable resource with a minute-resolution weekly availability grid (true = occupied)
///  and the bookings that cover it.
///
/// The grid and the booking map are kept in sync by the callers: `occupy` and `free` flip
///  minutes unconditionally, so every mutation pairs them with an `is_free` check (and
///  re-occupies on conflict) to keep the grid exactly the union of the booking slots.
pub struct Facility {
    name: String,
    week: Box<[[bool; MINUTES_PER_DAY as usize]; 7]>,
    bookings: FxHashMap<i64, Booking>,
}

impl Facility {
    pub fn new(name: impl Into<String>) -> Facility {
        Facility {
            name: name.into(),
            week: Box::new([[false; MINUTES_PER_DAY as usize]; 7]),
            bookings: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_free(&self, slot: Slot) -> bool {
        let day = &self.week[slot.day as usize];
        day[slot.start_min as usize..slot.end_min as usize]
            .iter()
            .all(|&occupied| !occupied)
    }

    pub fn occupy(&mut self, slot: Slot) {
        self.set_slot(slot, true);
    }

    pub fn free(&mut self, slot: Slot) {
        self.set_slot(slot, false);
    }

    fn set_slot(&mut self, slot: Slot, occupied: bool) {
        let day = &mut self.week[slot.day as usize];
        day[slot.start_min as usize..slot.end_min as usize].fill(occupied);
    }

    pub fn add_booking(&mut self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    pub fn remove_booking(&mut self, id: i64) -> Option<Booking> {
        self.bookings.remove(&id)
    }

    pub fn booking(&self, id: i64) -> Option<&Booking> {
        self.bookings.get(&id)
    }

    pub fn booking_mut(&mut self, id: i64) -> Option<&mut Booking> {
        self.bookings.get_mut(&id)
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// One day's occupied and free ranges in chronological order, e.g.
    /// ```text
    /// Mon:
    ///   Booked: 09:00-10:30
    ///   Free: 00:00-09:00, 10:30-24:00
    /// ```
    /// A fully free day renders as `All day free (00:00-24:00)`.
    pub fn detailed_availability(&self, day_idx: u8) -> String {
        let day = &self.week[day_idx as usize];
        let mut booked = Vec::new();
        let mut free = Vec::new();

        let mut i = 0;
        while i < MINUTES_PER_DAY as usize {
            let occupied = day[i];
            let start = i;
            while i < MINUTES_PER_DAY as usize && day[i] == occupied {
                i += 1;
            }
            let range = format!("{}-{}", min_to_hm(start as u16), min_to_hm(i as u16));
            if occupied {
                booked.push(range);
            } else {
                free.push(range);
            }
        }

        let mut out = format!("{}:\n", idx_to_day(day_idx));
        if booked.is_empty() {
            out.push_str("  All day free (00:00-24:00)\n");
        } else {
            out.push_str("  Booked: ");
            out.push_str(&booked.join(", "));
            out.push('\n');
            if free.is_empty() {
                out.push_str("  Free: None\n");
            } else {
                out.push_str("  Free: ");
                out.push_str(&free.join(", "));
                out.push('\n');
            }
        }
        out
    }

    /// Per-day free-minute counts for the whole week.
    pub fn weekly_summary(&self) -> String {
        let mut out = String::new();
        for day in 0..7u8 {
            let free = self.week[day as usize].iter().filter(|&&occupied| !occupied).count();
            out.push_str(&format!(
                "{}: free {}/{} minutes\n",
                idx_to_day(day),
                free,
                MINUTES_PER_DAY
            ));
        }
        out
    }
}


/// All facilities of one server process. Owns every [Booking]; everything else refers to
///  bookings by id.
pub struct FacilityStore {
    facilities: FxHashMap<String, Facility>,
}

impl FacilityStore {
    pub fn new<I, S>(names: I) -> FacilityStore
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let facilities = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), Facility::new(name))
            })
            .collect();
        FacilityStore { facilities }
    }

    pub fn get(&self, name: &str) -> Option<&Facility> {
        self.facilities.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Facility> {
        self.facilities.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facilities.contains_key(name)
    }

    /// Linear scan across all facilities. O(total bookings), which is fine at this scale; a
    ///  process-level id index could replace it behind this same API.
    pub fn find_booking(&self, id: i64) -> Option<&Booking> {
        self.facilities.values().find_map(|f| f.booking(id))
    }

    pub fn facility_of_booking(&self, id: i64) -> Option<&str> {
        self.facilities
            .values()
            .find(|f| f.booking(id).is_some())
            .map(|f| f.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: u8, start: u16, end: u16) -> Slot {
        Slot::new(day, start, end).unwrap()
    }

    /// The week grid must be exactly the union of the booking slots.
    fn assert_grid_matches_bookings(f: &Facility) {
        for day in 0..7u8 {
            for minute in 0..MINUTES_PER_DAY {
                let grid_occupied = !f.is_free(slot(day, minute, minute + 1));
                let covering = f
                    .bookings()
                    .filter(|b| b.slot.day == day && b.slot.start_min <= minute && minute < b.slot.end_min)
                    .count();
                assert_eq!(
                    grid_occupied,
                    covering == 1,
                    "day {} minute {}: grid={} covering={}",
                    day,
                    minute,
                    grid_occupied,
                    covering
                );
                assert!(covering <= 1, "overlapping bookings at day {} minute {}", day, minute);
            }
        }
    }

    #[test]
    fn test_occupy_free_is_free() {
        let mut f = Facility::new("RoomA");
        let s = slot(0, 540, 630);

        assert!(f.is_free(s));
        f.occupy(s);
        assert!(!f.is_free(s));
        assert!(!f.is_free(slot(0, 600, 660))); // overlapping tail
        assert!(f.is_free(slot(0, 630, 660))); // adjacent, half-open
        assert!(f.is_free(slot(1, 540, 630))); // other day

        f.free(s);
        assert!(f.is_free(s));
    }

    #[test]
    fn test_grid_matches_bookings_through_mutations() {
        let mut f = Facility::new("RoomA");

        let s1 = slot(0, 540, 630);
        f.occupy(s1);
        f.add_booking(Booking { id: 1, facility: "RoomA".to_string(), slot: s1 });

        let s2 = slot(0, 660, 720);
        f.occupy(s2);
        f.add_booking(Booking { id: 2, facility: "RoomA".to_string(), slot: s2 });
        assert_grid_matches_bookings(&f);

        // move booking 1 the way the handlers do: free, check, occupy, update
        let s1_moved = slot(1, 540, 630);
        f.free(s1);
        assert!(f.is_free(s1_moved));
        f.occupy(s1_moved);
        f.booking_mut(1).unwrap().slot = s1_moved;
        assert_grid_matches_bookings(&f);

        let removed = f.remove_booking(2).unwrap();
        f.free(removed.slot);
        assert_grid_matches_bookings(&f);
    }

    #[test]
    fn test_detailed_availability_free_day() {
        let f = Facility::new("RoomA");
        assert_eq!(f.detailed_availability(0), "Mon:\n  All day free (00:00-24:00)\n");
    }

    #[test]
    fn test_detailed_availability_with_bookings() {
        let mut f = Facility::new("RoomA");
        f.occupy(slot(2, 540, 630));
        f.occupy(slot(2, 840, 900));

        assert_eq!(
            f.detailed_availability(2),
            "Wed:\n  Booked: 09:00-10:30, 14:00-15:00\n  Free: 00:00-09:00, 10:30-14:00, 15:00-24:00\n"
        );
    }

    #[test]
    fn test_detailed_availability_fully_booked() {
        let mut f = Facility::new("RoomA");
        f.occupy(slot(5, 0, 1440));
        assert_eq!(f.detailed_availability(5), "Sat:\n  Booked: 00:00-24:00\n  Free: None\n");
    }

    #[test]
    fn test_detailed_availability_booked_until_midnight() {
        let mut f = Facility::new("RoomA");
        f.occupy(slot(6, 1380, 1440));
        assert_eq!(
            f.detailed_availability(6),
            "Sun:\n  Booked: 23:00-24:00\n  Free: 00:00-23:00\n"
        );
    }

    #[test]
    fn test_weekly_summary() {
        let mut f = Facility::new("RoomA");
        f.occupy(slot(0, 540, 630));

        let summary = f.weekly_summary();
        assert!(summary.starts_with("Mon: free 1350/1440 minutes\n"));
        assert!(summary.contains("Sun: free 1440/1440 minutes\n"));
        assert_eq!(summary.lines().count(), 7);
    }

    #[test]
    fn test_find_booking_across_facilities() {
        let mut store = FacilityStore::new(["RoomA", "RoomB"]);

        let s = slot(0, 540, 630);
        let f = store.get_mut("RoomB").unwrap();
        f.occupy(s);
        f.add_booking(Booking { id: 42, facility: "RoomB".to_string(), slot: s });

        assert_eq!(store.find_booking(42).unwrap().facility, "RoomB");
        assert_eq!(store.facility_of_booking(42), Some("RoomB"));
        assert!(store.find_booking(43).is_none());
        assert!(store.facility_of_booking(43).is_none());
    }

    #[test]
    fn test_store_lookup() {
        let store = FacilityStore::new(["RoomA", "RoomB", "LT1"]);
        assert!(store.contains("LT1"));
        assert!(!store.contains("lt1"));
        assert!(store.get("nowhere").is_none());
    }
}
