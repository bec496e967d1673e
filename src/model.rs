use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;

/// An active hold on a slot. Owned by the slot it sits in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub holder: String,
    pub start_time: Ms,
    pub duration_hours: u32,
}

impl Reservation {
    pub fn new(holder: impl Into<String>, start_time: Ms, duration_hours: u32) -> Self {
        Self {
            id: Ulid::new(),
            holder: holder.into(),
            start_time,
            duration_hours,
        }
    }

    /// Derived on every call so it can never drift from `start_time`.
    pub fn expires_at(&self) -> Ms {
        self.start_time + Ms::from(self.duration_hours) * HOUR_MS
    }

    pub fn is_expired(&self, now: Ms) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Free,
    Held(Reservation),
}

impl SlotState {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotState::Free)
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            SlotState::Free => None,
            SlotState::Held(r) => Some(r),
        }
    }
}

/// A single addressable parking space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: String,
    pub section: String,
    pub state: SlotState,
}

impl Slot {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let section = section_of(&id).to_string();
        Self {
            id,
            section,
            state: SlotState::Free,
        }
    }
}

/// Layout grouping for a slot id: `"A-1"` → `"A"`, `"B12"` → `"B"`.
pub fn section_of(id: &str) -> &str {
    if let Some((prefix, _)) = id.split_once('-')
        && !prefix.is_empty()
    {
        return prefix;
    }
    let alpha = id
        .char_indices()
        .find(|(_, c)| !c.is_alphabetic())
        .map_or(id.len(), |(i, _)| i);
    if alpha == 0 { id } else { &id[..alpha] }
}

/// Which slots a query should return. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    pub section: Option<String>,
    pub state: Option<StateFilter>,
    pub holder: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Free,
    Held,
}

impl SlotFilter {
    pub fn matches(&self, slot: &Slot) -> bool {
        if let Some(section) = &self.section
            && *section != slot.section
        {
            return false;
        }
        match self.state {
            Some(StateFilter::Free) if !slot.state.is_free() => return false,
            Some(StateFilter::Held) if slot.state.is_free() => return false,
            _ => {}
        }
        if let Some(holder) = &self.holder {
            return slot.state.reservation().is_some_and(|r| r.holder == *holder);
        }
        true
    }
}

/// WAL record format. Slots themselves come from the seed set; only state changes are logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Held {
        slot_id: String,
        reservation: Reservation,
    },
    Freed {
        slot_id: String,
    },
}

impl Event {
    pub fn slot_id(&self) -> &str {
        match self {
            Event::Held { slot_id, .. } | Event::Freed { slot_id } => slot_id,
        }
    }

    /// The state a slot is in after this event is applied.
    pub fn resulting_state(&self) -> SlotState {
        match self {
            Event::Held { reservation, .. } => SlotState::Held(reservation.clone()),
            Event::Freed { .. } => SlotState::Free,
        }
    }

    pub fn for_transition(slot_id: &str, new: &SlotState) -> Self {
        match new {
            SlotState::Free => Event::Freed {
                slot_id: slot_id.to_string(),
            },
            SlotState::Held(reservation) => Event::Held {
                slot_id: slot_id.to_string(),
                reservation: reservation.clone(),
            },
        }
    }
}

/// Slot ids of the stock facility layout, used when no seed is configured.
pub const DEFAULT_SEED: &[&str] = &[
    "A-1", "A-2", "A-3", "B-1", "B-2", "C-1", "C-2", "D-1", "D-2",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_at_is_derived() {
        let r = Reservation::new("u1", 1_000, 2);
        assert_eq!(r.expires_at(), 1_000 + 2 * HOUR_MS);
        assert!(!r.is_expired(1_000 + 2 * HOUR_MS - 1));
        assert!(r.is_expired(1_000 + 2 * HOUR_MS)); // inclusive
    }

    #[test]
    fn reservations_are_unique_even_with_same_payload() {
        let a = Reservation::new("u1", 0, 1);
        let b = Reservation::new("u1", 0, 1);
        assert_ne!(SlotState::Held(a), SlotState::Held(b));
    }

    #[test]
    fn section_from_prefix() {
        assert_eq!(section_of("A-1"), "A");
        assert_eq!(section_of("Lvl2-14"), "Lvl2");
        assert_eq!(section_of("B12"), "B");
        assert_eq!(section_of("42"), "42");
        assert_eq!(section_of("-7"), "-7");
    }

    #[test]
    fn new_slot_is_free() {
        let s = Slot::new("C-2");
        assert_eq!(s.section, "C");
        assert!(s.state.is_free());
        assert!(s.state.reservation().is_none());
    }

    #[test]
    fn filter_by_section_state_and_holder() {
        let free = Slot::new("A-1");
        let mut held = Slot::new("B-1");
        held.state = SlotState::Held(Reservation::new("u1", 0, 1));

        assert!(SlotFilter::default().matches(&free));
        assert!(SlotFilter::default().matches(&held));

        let by_section = SlotFilter {
            section: Some("A".into()),
            ..Default::default()
        };
        assert!(by_section.matches(&free));
        assert!(!by_section.matches(&held));

        let only_held = SlotFilter {
            state: Some(StateFilter::Held),
            ..Default::default()
        };
        assert!(!only_held.matches(&free));
        assert!(only_held.matches(&held));

        let mine = SlotFilter {
            holder: Some("u1".into()),
            ..Default::default()
        };
        assert!(mine.matches(&held));
        assert!(!mine.matches(&free));

        let theirs = SlotFilter {
            holder: Some("u2".into()),
            ..Default::default()
        };
        assert!(!theirs.matches(&held));
    }

    #[test]
    fn event_transition_mapping() {
        let r = Reservation::new("u1", 10, 3);
        let held = SlotState::Held(r.clone());
        let ev = Event::for_transition("A-1", &held);
        assert_eq!(ev.slot_id(), "A-1");
        assert_eq!(ev.resulting_state(), held);

        let ev = Event::for_transition("A-1", &SlotState::Free);
        assert_eq!(ev, Event::Freed { slot_id: "A-1".into() });
        assert_eq!(ev.resulting_state(), SlotState::Free);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::Held {
            slot_id: "D-2".into(),
            reservation: Reservation::new("driver@example.com", 1_700_000_000_000, 12),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
