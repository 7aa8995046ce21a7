pub mod loss;

use std::time::{SystemTime, UNIX_EPOCH};


/// Request ids must be unique within a process; a high-resolution wall clock reading is
///  sufficient for that (and mirrors what the protocol's peers do). Used for client requests
///  and for server-initiated monitor update datagrams alike.
pub fn fresh_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before UNIX epoch")
        .as_nanos() as u64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fresh_request_id_changes() {
        let a = fresh_request_id();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = fresh_request_id();
        assert!(b > a);
    }
}
