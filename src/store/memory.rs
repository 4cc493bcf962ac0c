use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::game::state::{PlayerEntry, Room, RoomPatch, RoomStatus};
use crate::net::signaling::Signal;
use crate::store::{
    RoomStore, RoomSubscription, SignalCursor, SignalInbox, SignalingRelay, StoreError,
};

struct RoomSlot {
    room: Room,
    tx: watch::Sender<Option<Room>>,
}

impl RoomSlot {
    fn publish(&self) {
        self.tx.send_replace(Some(self.room.clone()));
    }
}

type SignalLog = Arc<Mutex<Vec<Signal>>>;

/// In-process room store and signaling relay.
///
/// Every operation runs under one lock, which makes each call atomic and
/// gives all subscribers the same total order of writes per room.
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RoomSlot>>,
    signals: RwLock<HashMap<String, SignalLog>>,
    fail_writes: AtomicU32,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            signals: RwLock::new(HashMap::new()),
            fail_writes: AtomicU32::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Make the next `count` writes fail with `Unavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    fn begin_write(&self) -> Result<(), StoreError> {
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn commit(&self, slot: &RoomSlot, changed: bool) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if changed {
            slot.publish();
        }
    }

    fn signal_log(&self, room_id: &str) -> SignalLog {
        if let Some(log) = self.signals.read().get(room_id) {
            return log.clone();
        }
        self.signals
            .write()
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore for MemoryStore {
    fn create_room(&self, room: Room) -> Result<(), StoreError> {
        self.begin_write()?;
        let (tx, _) = watch::channel(Some(room.clone()));
        let mut rooms = self.rooms.write();
        let id = room.id.clone();
        let slot = RoomSlot { room, tx };
        self.commit(&slot, false);
        rooms.insert(id, slot);
        Ok(())
    }

    fn fetch(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.read().get(room_id).map(|slot| slot.room.clone()))
    }

    fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError> {
        let rooms = self.rooms.read();
        let slot = rooms.get(room_id).ok_or(StoreError::RoomNotFound)?;
        Ok(RoomSubscription::new(slot.tx.subscribe()))
    }

    fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<(), StoreError> {
        self.begin_write()?;
        let mut rooms = self.rooms.write();
        let slot = rooms.get_mut(room_id).ok_or(StoreError::RoomNotFound)?;
        let changed = patch.apply(&mut slot.room)?;
        self.commit(slot, changed);
        Ok(())
    }

    fn join(&self, room_id: &str, player: PlayerEntry, capacity: usize) -> Result<Room, StoreError> {
        self.begin_write()?;
        let mut rooms = self.rooms.write();
        let slot = rooms.get_mut(room_id).ok_or(StoreError::RoomNotFound)?;

        if slot.room.has_player(&player.uid) {
            return Ok(slot.room.clone());
        }
        if slot.room.status != RoomStatus::Waiting {
            return Err(StoreError::GameInProgress);
        }
        if slot.room.players.len() >= capacity {
            return Err(StoreError::RoomFull { capacity });
        }

        slot.room.players.push(player);
        self.commit(slot, true);
        Ok(slot.room.clone())
    }

    fn remove_player(&self, room_id: &str, uid: &str) -> Result<(), StoreError> {
        self.begin_write()?;
        let mut rooms = self.rooms.write();
        let slot = rooms.get_mut(room_id).ok_or(StoreError::RoomNotFound)?;
        let before = slot.room.players.len();
        slot.room.players.retain(|p| p.uid != uid);
        let changed = slot.room.players.len() != before;
        self.commit(slot, changed);
        Ok(())
    }

    fn increment_threat(&self, room_id: &str, noise_maker: &str) -> Result<u32, StoreError> {
        self.begin_write()?;
        let mut rooms = self.rooms.write();
        let slot = rooms.get_mut(room_id).ok_or(StoreError::RoomNotFound)?;
        slot.room.threat_level = slot.room.threat_level.saturating_add(1);
        slot.room.last_noise_maker = Some(noise_maker.to_string());
        self.commit(slot, true);
        Ok(slot.room.threat_level)
    }

    fn append_caught_if_absent(&self, room_id: &str, uid: &str) -> Result<bool, StoreError> {
        self.begin_write()?;
        let mut rooms = self.rooms.write();
        let slot = rooms.get_mut(room_id).ok_or(StoreError::RoomNotFound)?;
        if slot.room.is_caught(uid) {
            self.commit(slot, false);
            return Ok(false);
        }
        slot.room.caught_players.push(uid.to_string());
        self.commit(slot, true);
        Ok(true)
    }

    fn list_waiting(&self) -> Result<Vec<Room>, StoreError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .read()
            .values()
            .filter(|slot| slot.room.status == RoomStatus::Waiting)
            .map(|slot| slot.room.clone())
            .collect();
        rooms.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        self.begin_write()?;
        let removed = self.rooms.write().remove(room_id);
        self.signals.write().remove(room_id);
        match removed {
            Some(slot) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                slot.tx.send_replace(None);
                Ok(())
            }
            None => Err(StoreError::RoomNotFound),
        }
    }
}

struct MemoryInbox {
    log: SignalLog,
    to: String,
    cursor: usize,
}

impl SignalInbox for MemoryInbox {
    fn drain(&mut self) -> Vec<Signal> {
        let log = self.log.lock();
        let fresh = log[self.cursor.min(log.len())..]
            .iter()
            .filter(|s| s.to == self.to)
            .cloned()
            .collect();
        self.cursor = log.len();
        fresh
    }
}

impl SignalingRelay for MemoryStore {
    fn publish(&self, room_id: &str, signal: Signal) -> Result<(), StoreError> {
        self.begin_write()?;
        self.signal_log(room_id).lock().push(signal);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_signals(
        &self,
        room_id: &str,
        to: &str,
        cursor: SignalCursor,
    ) -> Result<Box<dyn SignalInbox>, StoreError> {
        let log = self.signal_log(room_id);
        let start = match cursor {
            SignalCursor::Beginning => 0,
            SignalCursor::Now => log.lock().len(),
        };
        Ok(Box::new(MemoryInbox {
            log,
            to: to.to_string(),
            cursor: start,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::AiState;
    use crate::net::signaling::SessionDescription;
    use crate::util::vec3::Vec3;

    fn store_with_room() -> MemoryStore {
        let store = MemoryStore::new();
        let room = Room::new(
            "r1".into(),
            "Hush".into(),
            PlayerEntry::new("alice", "Player-alice"),
            Vec3::new(1.0, 1.0, 1.0),
        );
        store.create_room(room).unwrap();
        store
    }

    #[test]
    fn test_join_rules() {
        let store = store_with_room();
        store.join("r1", PlayerEntry::new("bob", "b"), 2).unwrap();
        // duplicate is a no-op
        let room = store.join("r1", PlayerEntry::new("bob", "b"), 2).unwrap();
        assert_eq!(room.player_count(), 2);

        let err = store.join("r1", PlayerEntry::new("carol", "c"), 2).unwrap_err();
        assert_eq!(err, StoreError::RoomFull { capacity: 2 });
        assert_eq!(store.fetch("r1").unwrap().unwrap().player_count(), 2);

        assert_eq!(
            store.join("nope", PlayerEntry::new("carol", "c"), 5).unwrap_err(),
            StoreError::RoomNotFound
        );
    }

    #[test]
    fn test_join_rejected_once_started() {
        let store = store_with_room();
        store.update("r1", &RoomPatch::status(RoomStatus::InGame)).unwrap();
        let err = store.join("r1", PlayerEntry::new("bob", "b"), 5).unwrap_err();
        assert_eq!(err, StoreError::GameInProgress);
    }

    #[test]
    fn test_append_caught_is_exactly_once() {
        let store = store_with_room();
        assert!(store.append_caught_if_absent("r1", "alice").unwrap());
        assert!(!store.append_caught_if_absent("r1", "alice").unwrap());
        assert_eq!(store.fetch("r1").unwrap().unwrap().caught_players, vec!["alice"]);
    }

    #[test]
    fn test_increment_threat_records_maker() {
        let store = store_with_room();
        store.increment_threat("r1", "alice").unwrap();
        assert_eq!(store.increment_threat("r1", "bob").unwrap(), 2);
        let room = store.fetch("r1").unwrap().unwrap();
        assert_eq!(room.threat_level, 2);
        assert_eq!(room.last_noise_maker.as_deref(), Some("bob"));
    }

    #[test]
    fn test_injected_failures_leave_room_untouched() {
        let store = store_with_room();
        store.fail_next_writes(1);
        let err = store.update("r1", &RoomPatch::start_hunting("alice")).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.fetch("r1").unwrap().unwrap().ai.state, AiState::Dormant);

        store.update("r1", &RoomPatch::start_hunting("alice")).unwrap();
        assert_eq!(store.fetch("r1").unwrap().unwrap().ai.state, AiState::Hunting);
    }

    #[test]
    fn test_list_waiting_skips_started() {
        let store = store_with_room();
        let other = Room::new(
            "r2".into(),
            "Other".into(),
            PlayerEntry::new("bob", "b"),
            Vec3::ZERO,
        );
        store.create_room(other).unwrap();
        store.update("r1", &RoomPatch::status(RoomStatus::InGame)).unwrap();
        let ids: Vec<_> = store.list_waiting().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn test_subscription_sees_updates_and_deletion() {
        let store = store_with_room();
        let mut sub = store.subscribe("r1").unwrap();
        assert!(sub.current().is_some());
        assert!(!sub.has_changed());

        store.increment_threat("r1", "alice").unwrap();
        assert!(sub.changed().await);
        assert_eq!(sub.current().unwrap().threat_level, 1);

        store.delete_room("r1").unwrap();
        assert!(sub.changed().await);
        assert!(sub.current().is_none());
    }

    #[test]
    fn test_changed_pending_until_write() {
        let store = store_with_room();
        let mut sub = store.subscribe("r1").unwrap();
        sub.current();

        let mut changed = tokio_test::task::spawn(sub.changed());
        tokio_test::assert_pending!(changed.poll());
        store.increment_threat("r1", "bob").unwrap();
        assert!(changed.is_woken());
        tokio_test::assert_ready_eq!(changed.poll(), true);
    }

    #[test]
    fn test_noop_update_does_not_notify() {
        let store = store_with_room();
        let mut sub = store.subscribe("r1").unwrap();
        sub.current();
        store.remove_player("r1", "nobody").unwrap();
        assert!(!sub.has_changed());
    }

    #[test]
    fn test_signal_inbox_filters_and_cursors() {
        let store = MemoryStore::new();
        let offer = Signal::sdp("alice", "bob", SessionDescription::offer("o"));
        store.publish("r1", offer.clone()).unwrap();

        let mut replay = store.subscribe_signals("r1", "bob", SignalCursor::Beginning).unwrap();
        let mut live = store.subscribe_signals("r1", "bob", SignalCursor::Now).unwrap();

        store
            .publish("r1", Signal::sdp("bob", "alice", SessionDescription::answer("a")))
            .unwrap();
        let second = Signal::sdp("carol", "bob", SessionDescription::offer("o2"));
        store.publish("r1", second.clone()).unwrap();

        assert_eq!(replay.drain(), vec![offer, second.clone()]);
        assert_eq!(live.drain(), vec![second]);
        assert!(replay.drain().is_empty());
    }
}
