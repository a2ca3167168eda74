//! Notification Dispatch
//!
//! Sends to one player or fans out to many. A failed write never aborts a
//! broadcast: the connection is marked closed and its worker cleans up.

use std::sync::Arc;

use tracing::debug;

use crate::core::ids::SessionId;
use crate::network::protocol::Response;
use crate::network::session::Player;

/// Send `response` to `player`. Returns whether the write succeeded.
pub async fn send_to(player: &Player, response: &Response) -> bool {
    match player.connection().send(response).await {
        Ok(()) => true,
        Err(e) => {
            debug!(
                "Dropping {} for {} ({}): {}",
                response.code,
                player.name(),
                player.id().short(),
                e
            );
            false
        }
    }
}

/// Send `response` to every player except `excluding`, in order.
///
/// Returns the number of successful writes.
pub async fn broadcast<'a, I>(players: I, response: &Response, excluding: Option<SessionId>) -> usize
where
    I: IntoIterator<Item = &'a Arc<Player>>,
{
    let mut delivered = 0;
    for player in players {
        if Some(player.id()) == excluding {
            continue;
        }
        if send_to(player, response).await {
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::ResponseCode;
    use crate::network::session::testing::player;

    #[tokio::test]
    async fn test_broadcast_skips_excluded() {
        let (a, mut inbox_a) = player("a", "en");
        let (b, mut inbox_b) = player("b", "en");
        let players = vec![a.clone(), b];

        let delivered = broadcast(&players, &Response::new(ResponseCode::PlayerJoined, "c"), Some(a.id())).await;
        assert_eq!(delivered, 1);
        assert!(inbox_a.codes().await.is_empty());
        assert_eq!(inbox_b.codes().await, vec![ResponseCode::PlayerJoined]);
    }

    #[tokio::test]
    async fn test_dead_peer_does_not_stop_broadcast() {
        let (a, inbox_a) = player("a", "en");
        let (b, mut inbox_b) = player("b", "en");
        drop(inbox_a);
        let players = vec![a.clone(), b];

        let delivered = broadcast(&players, &Response::new(ResponseCode::Wait, "wait"), None).await;
        assert_eq!(delivered, 1);
        assert!(a.connection().is_closed());
        assert_eq!(inbox_b.codes().await, vec![ResponseCode::Wait]);
    }
}
