//! Shared setup for the Huddle benchmarks.

use huddle_core::{ClientSession, Hub, HubConfig, HubHandle};

/// Build a current-thread runtime for benchmark bodies.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

/// Spawn a hub whose client queues can absorb `members` join announcements.
pub fn spawn_hub(members: usize) -> HubHandle {
    Hub::spawn(HubConfig {
        client_queue_capacity: members + 256,
        ..HubConfig::default()
    })
}

/// Join `members` clients to `room` and drain their join announcements.
///
/// # Panics
///
/// Panics if the hub stops.
pub async fn fill_room(hub: &HubHandle, room: &str, members: usize) -> Vec<ClientSession> {
    let mut sessions = Vec::with_capacity(members);
    for i in 0..members {
        sessions.push(hub.join(format!("user-{i}"), room).await.expect("hub running"));
    }

    // Client i sees its own join and every later one.
    for (i, session) in sessions.iter_mut().enumerate() {
        for _ in i..members {
            session.outbound.recv().await.expect("join announcement");
        }
    }

    sessions
}
