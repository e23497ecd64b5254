use std::collections::HashMap;

use chrono::{Duration, SubsecRound};
use tokio::sync::RwLock;

use studio_pos_core::domain::cancellation::{
    CancellationRequest, CancellationRequestId, CancellationStatus, Resolution,
};
use studio_pos_core::domain::movement::{
    CancellationState, ClientId, Movement, MovementId, NewMovement,
};
use studio_pos_core::domain::timestamp_now;
use studio_pos_core::domain::user::{User, UserId};
use studio_pos_core::errors::DomainError;

use super::{
    new_session_token, CancellationRepository, MovementFilter, MovementRepository,
    RepositoryError, Session, UserRepository,
};

struct Sequenced<T> {
    seq: u64,
    record: T,
}

#[derive(Default)]
struct SalesState {
    movements: HashMap<String, Sequenced<Movement>>,
    requests: HashMap<String, Sequenced<CancellationRequest>>,
    next_seq: u64,
}

impl SalesState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

fn newest_first<T: Clone>(
    mut records: Vec<&Sequenced<T>>,
    created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<T> {
    records.sort_by(|a, b| {
        created_at(&b.record).cmp(&created_at(&a.record)).then(b.seq.cmp(&a.seq))
    });
    records.into_iter().map(|entry| entry.record.clone()).collect()
}

/// Movements and cancellation requests behind a single lock, so the
/// workflow's two-record transitions are atomic like the SQL transactions.
#[derive(Default)]
pub struct InMemorySalesStore {
    state: RwLock<SalesState>,
}

#[async_trait::async_trait]
impl MovementRepository for InMemorySalesStore {
    async fn create(&self, movement: NewMovement) -> Result<Movement, RepositoryError> {
        let mut movement = movement.into_movement(timestamp_now())?;
        movement.created_at = movement.created_at.trunc_subsecs(6);

        let mut state = self.state.write().await;
        if state.movements.contains_key(&movement.id.0) {
            return Err(DomainError::InvariantViolation(format!(
                "movement `{}` already exists",
                movement.id
            ))
            .into());
        }
        let seq = state.next_seq();
        state.movements.insert(movement.id.0.clone(), Sequenced { seq, record: movement.clone() });
        Ok(movement)
    }

    async fn find_by_id(&self, id: &MovementId) -> Result<Option<Movement>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.movements.get(&id.0).map(|entry| entry.record.clone()))
    }

    async fn list(&self, filter: MovementFilter) -> Result<Vec<Movement>, RepositoryError> {
        let state = self.state.read().await;
        let matching = state
            .movements
            .values()
            .filter(|entry| filter.include_pending || !entry.record.is_pending_review())
            .collect();
        Ok(newest_first(matching, |movement: &Movement| movement.created_at))
    }

    async fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Movement>, RepositoryError> {
        let state = self.state.read().await;
        let matching =
            state.movements.values().filter(|entry| &entry.record.client_id == client_id).collect();
        Ok(newest_first(matching, |movement: &Movement| movement.created_at))
    }

    async fn hard_delete(&self, id: &MovementId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let pending = match state.movements.get(&id.0) {
            Some(entry) => entry.record.is_pending_review(),
            None => return Err(DomainError::MovementNotFound(id.clone()).into()),
        };
        if pending {
            return Err(DomainError::AlreadyPending { movement_id: id.clone() }.into());
        }

        state.movements.remove(&id.0);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CancellationRepository for InMemorySalesStore {
    async fn open(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationRequest, RepositoryError> {
        if request.status != CancellationStatus::Pending {
            return Err(DomainError::InvariantViolation(format!(
                "cancellation request `{}` must be opened as pending",
                request.id
            ))
            .into());
        }

        let mut state = self.state.write().await;
        let seq = state.next_seq();
        let movement = state
            .movements
            .get_mut(&request.movement_id.0)
            .ok_or_else(|| DomainError::MovementNotFound(request.movement_id.clone()))?;
        if movement.record.is_pending_review() {
            return Err(
                DomainError::AlreadyPending { movement_id: request.movement_id.clone() }.into()
            );
        }

        movement.record.cancellation_state = CancellationState::PendingReview;
        state.requests.insert(request.id.0.clone(), Sequenced { seq, record: request.clone() });
        Ok(request)
    }

    async fn find_by_id(
        &self,
        id: &CancellationRequestId,
    ) -> Result<Option<CancellationRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).map(|entry| entry.record.clone()))
    }

    async fn list(
        &self,
        status: Option<CancellationStatus>,
    ) -> Result<Vec<CancellationRequest>, RepositoryError> {
        let state = self.state.read().await;
        let matching = state
            .requests
            .values()
            .filter(|entry| status.map_or(true, |status| entry.record.status == status))
            .collect();
        Ok(newest_first(matching, |request: &CancellationRequest| request.created_at))
    }

    async fn resolve(
        &self,
        id: &CancellationRequestId,
        resolution: Resolution,
    ) -> Result<CancellationRequest, RepositoryError> {
        let mut state = self.state.write().await;
        let entry = state
            .requests
            .get_mut(&id.0)
            .ok_or_else(|| DomainError::CancellationRequestNotFound(id.clone()))?;
        entry.record.resolve(&resolution)?;
        let resolved = entry.record.clone();

        match resolved.status {
            CancellationStatus::Approved => {
                state.movements.remove(&resolved.movement_id.0);
            }
            _ => {
                if let Some(movement) = state.movements.get_mut(&resolved.movement_id.0) {
                    movement.record.cancellation_state = CancellationState::None;
                }
            }
        }

        Ok(resolved)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let user_id = {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if session.expires_at > timestamp_now() => session.user_id.clone(),
                _ => return Ok(None),
            }
        };
        self.find_by_id(&user_id).await
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn issue_session(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<Session, RepositoryError> {
        if self.find_by_id(user_id).await?.is_none() {
            return Err(DomainError::InvariantViolation(format!("user `{user_id}` does not exist"))
                .into());
        }

        let session = Session {
            token: new_session_token(),
            user_id: user_id.clone(),
            expires_at: timestamp_now() + ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use studio_pos_core::domain::cancellation::{
        CancellationDecision, CancellationRequest, CancellationStatus, Resolution,
    };
    use studio_pos_core::domain::movement::{ClientId, Movement, MovementCategory, SaleDraft};
    use studio_pos_core::domain::timestamp_now;
    use studio_pos_core::domain::user::{Role, User, UserId};
    use studio_pos_core::errors::DomainError;
    use studio_pos_core::pricing::LineItem;

    use super::{InMemorySalesStore, InMemoryUserRepository};
    use crate::repositories::{
        CancellationRepository, MovementFilter, MovementRepository, RepositoryError,
        UserRepository,
    };

    async fn record(store: &InMemorySalesStore, client: &str, minutes: i64) -> Movement {
        let mut record = SaleDraft::new(
            ClientId(client.to_string()),
            MovementCategory::Course,
            vec![LineItem::new("Curso de microblading", Decimal::new(350000, 2), 1)],
        )
        .price()
        .expect("price");
        record.created_at = Some(
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().expect("date")
                + Duration::minutes(minutes),
        );
        MovementRepository::create(store, record).await.expect("create")
    }

    fn request_for(movement: &Movement) -> CancellationRequest {
        CancellationRequest::open(
            movement.id.clone(),
            UserId("staff-1".to_string()),
            "cliente no asistió",
            timestamp_now(),
        )
        .expect("open")
    }

    fn resolution(decision: CancellationDecision) -> Resolution {
        Resolution::new(decision, UserId("admin-1".to_string()), None, timestamp_now())
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_hide_pending() {
        let store = InMemorySalesStore::default();
        let oldest = record(&store, "cli-1", 0).await;
        let middle = record(&store, "cli-1", 1).await;
        let newest = record(&store, "cli-2", 2).await;
        store.open(request_for(&middle)).await.expect("open");

        let visible = MovementRepository::list(&store, MovementFilter::visible())
            .await
            .expect("visible");
        assert_eq!(
            visible.iter().map(|movement| movement.id.clone()).collect::<Vec<_>>(),
            vec![newest.id.clone(), oldest.id.clone()]
        );

        let all = MovementRepository::list(&store, MovementFilter::all()).await.expect("all");
        assert_eq!(all.len(), 3);

        let history =
            store.list_by_client(&ClientId("cli-1".to_string())).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, middle.id);
        assert!(history[0].is_pending_review());
    }

    #[tokio::test]
    async fn open_is_exclusive_per_movement() {
        let store = InMemorySalesStore::default();
        let movement = record(&store, "cli-1", 0).await;

        store.open(request_for(&movement)).await.expect("first");
        let error = store.open(request_for(&movement)).await.expect_err("second");

        assert!(matches!(error, RepositoryError::Domain(DomainError::AlreadyPending { .. })));
        assert_eq!(CancellationRepository::list(&store, None).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_opens_admit_exactly_one() {
        let store = std::sync::Arc::new(InMemorySalesStore::default());
        let movement = record(&store, "cli-1", 0).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let request = request_for(&movement);
            handles.push(tokio::spawn(async move { store.open(request).await }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("join").is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        let pending = CancellationRepository::list(&*store, Some(CancellationStatus::Pending))
            .await
            .expect("list");
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn approve_and_deny_apply_movement_side_effects() {
        let store = InMemorySalesStore::default();
        let kept = record(&store, "cli-1", 0).await;
        let removed = record(&store, "cli-1", 1).await;
        let kept_request = store.open(request_for(&kept)).await.expect("open kept");
        let removed_request = store.open(request_for(&removed)).await.expect("open removed");

        store
            .resolve(&kept_request.id, resolution(CancellationDecision::Denied))
            .await
            .expect("deny");
        store
            .resolve(&removed_request.id, resolution(CancellationDecision::Approved))
            .await
            .expect("approve");

        let visible = MovementRepository::list(&store, MovementFilter::all()).await.expect("list");
        assert_eq!(visible, vec![kept]);
    }

    #[tokio::test]
    async fn resolved_request_is_not_resolved_again() {
        let store = InMemorySalesStore::default();
        let movement = record(&store, "cli-1", 0).await;
        let opened = store.open(request_for(&movement)).await.expect("open");
        let approved = store
            .resolve(&opened.id, resolution(CancellationDecision::Approved))
            .await
            .expect("approve");

        let error = store
            .resolve(&opened.id, resolution(CancellationDecision::Denied))
            .await
            .expect_err("second resolution");

        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::AlreadyResolved {
                status: CancellationStatus::Approved,
                ..
            })
        ));
        let current = CancellationRepository::find_by_id(&store, &opened.id).await.expect("find");
        assert_eq!(current, Some(approved));
    }

    #[tokio::test]
    async fn user_sessions_expire() {
        let users = InMemoryUserRepository::default();
        let admin = User::new("admin-1", "Dirección", Role::Admin);
        users.save(admin.clone()).await.expect("save");

        let live = users.issue_session(&admin.id, Duration::hours(1)).await.expect("live");
        let stale = users.issue_session(&admin.id, Duration::seconds(-5)).await.expect("stale");

        assert_eq!(users.find_by_session_token(&live.token).await.expect("live"), Some(admin));
        assert!(users.find_by_session_token(&stale.token).await.expect("stale").is_none());
    }
}
