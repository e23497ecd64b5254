use std::sync::Arc;

use tracing::{info, warn};

use studio_pos_core::authz::{authorize, Action};
use studio_pos_core::domain::movement::{ClientId, Movement, MovementId, NewMovement, SaleDraft};
use studio_pos_core::domain::user::User;
use studio_pos_core::errors::{ApplicationError, DomainError};

use crate::repositories::{MovementFilter, MovementRepository};

pub struct MovementService {
    movements: Arc<dyn MovementRepository>,
}

impl MovementService {
    pub fn new(movements: Arc<dyn MovementRepository>) -> Self {
        Self { movements }
    }

    /// Prices the draft and stores the resulting movement.
    pub async fn record_sale(
        &self,
        draft: SaleDraft,
        actor: &User,
    ) -> Result<Movement, ApplicationError> {
        authorize(actor, Action::RecordSale)?;
        let record = draft.price()?;
        self.store(record, actor).await
    }

    /// Stores an already priced movement; the amount must still match its
    /// subtotal and discount.
    pub async fn create(
        &self,
        record: NewMovement,
        actor: &User,
    ) -> Result<Movement, ApplicationError> {
        authorize(actor, Action::RecordSale)?;
        self.store(record, actor).await
    }

    async fn store(&self, record: NewMovement, actor: &User) -> Result<Movement, ApplicationError> {
        let movement = self.movements.create(record).await?;
        info!(
            event_name = "movement.recorded",
            movement_id = %movement.id,
            folio = %movement.folio.0,
            category = movement.category.as_str(),
            amount = %movement.amount,
            actor = %actor.id,
            "movement recorded"
        );
        Ok(movement)
    }

    pub async fn list(
        &self,
        include_pending: bool,
        actor: &User,
    ) -> Result<Vec<Movement>, ApplicationError> {
        authorize(actor, Action::ListMovements)?;
        Ok(self.movements.list(MovementFilter { include_pending }).await?)
    }

    pub async fn history(
        &self,
        client_id: &ClientId,
        actor: &User,
    ) -> Result<Vec<Movement>, ApplicationError> {
        authorize(actor, Action::ViewClientHistory)?;
        Ok(self.movements.list_by_client(client_id).await?)
    }

    pub async fn find(&self, id: &MovementId, actor: &User) -> Result<Movement, ApplicationError> {
        authorize(actor, Action::ListMovements)?;
        self.movements
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::MovementNotFound(id.clone()).into())
    }

    /// Privileged direct delete. Movements under review must go through the
    /// cancellation workflow instead.
    pub async fn delete(&self, id: &MovementId, actor: &User) -> Result<(), ApplicationError> {
        if let Err(error) = authorize(actor, Action::DeleteMovement) {
            warn!(
                event_name = "movement.delete_forbidden",
                movement_id = %id,
                actor = %actor.id,
                "non-admin attempted to delete a movement"
            );
            return Err(error.into());
        }

        self.movements.hard_delete(id).await?;
        info!(
            event_name = "movement.deleted",
            movement_id = %id,
            actor = %actor.id,
            "movement deleted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use studio_pos_core::domain::movement::{ClientId, MovementId};
    use studio_pos_core::errors::{ApplicationError, DomainError};
    use studio_pos_core::pricing::{Discount, PricingError};

    use crate::repositories::test_support::{admin, staff};
    use crate::services::test_support::{
        dec, deposit_covered_service, in_memory, plain_service, sql, Harness,
    };

    async fn deposit_fully_covers_service(harness: Harness) {
        let movement = harness
            .movements
            .record_sale(deposit_covered_service(), &staff())
            .await
            .expect("record sale");

        assert_eq!(movement.subtotal, dec("1570"));
        assert_eq!(movement.discount_amount(), dec("1570"));
        assert_eq!(movement.amount, Decimal::ZERO);
        assert_eq!(harness.movements.find(&movement.id, &staff()).await.expect("find"), movement);
    }

    #[tokio::test]
    async fn deposit_fully_covers_service_in_memory() {
        deposit_fully_covers_service(in_memory()).await;
    }

    #[tokio::test]
    async fn deposit_fully_covers_service_sql() {
        deposit_fully_covers_service(sql().await).await;
    }

    #[tokio::test]
    async fn percentage_discount_prices_before_storing() {
        let harness = in_memory();
        let draft = plain_service("cli-1", "1000")
            .with_discount(Discount::Percentage { value: dec("20") }, None);

        let movement = harness.movements.record_sale(draft, &staff()).await.expect("record");

        assert_eq!(movement.discount_amount(), dec("200"));
        assert_eq!(movement.amount, dec("800"));
    }

    #[tokio::test]
    async fn invalid_cart_is_rejected_before_storage() {
        let harness = in_memory();
        let mut draft = plain_service("cli-1", "500");
        draft.line_items[0].quantity = 0;

        let error = harness.movements.record_sale(draft, &staff()).await.expect_err("bad qty");

        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Pricing(PricingError::InvalidLineItem { .. }))
        ));
        assert!(harness.movements.list(true, &admin()).await.expect("list").is_empty());
    }

    async fn history_is_per_client_and_newest_first(harness: Harness) {
        let first = harness
            .movements
            .record_sale(plain_service("cli-1", "100"), &staff())
            .await
            .expect("first");
        harness
            .movements
            .record_sale(plain_service("cli-2", "100"), &staff())
            .await
            .expect("other");
        let second = harness
            .movements
            .record_sale(plain_service("cli-1", "250"), &staff())
            .await
            .expect("second");

        let history = harness
            .movements
            .history(&ClientId("cli-1".to_string()), &staff())
            .await
            .expect("history");

        let ids: Vec<_> = history.into_iter().map(|movement| movement.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn history_is_per_client_and_newest_first_in_memory() {
        history_is_per_client_and_newest_first(in_memory()).await;
    }

    #[tokio::test]
    async fn history_is_per_client_and_newest_first_sql() {
        history_is_per_client_and_newest_first(sql().await).await;
    }

    async fn only_admins_delete_directly(harness: Harness) {
        let movement = harness
            .movements
            .record_sale(plain_service("cli-1", "100"), &staff())
            .await
            .expect("record");

        let error = harness.movements.delete(&movement.id, &staff()).await.expect_err("staff");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Forbidden { .. })));
        assert!(harness.movements.find(&movement.id, &staff()).await.is_ok());

        harness.movements.delete(&movement.id, &admin()).await.expect("admin delete");
        let error = harness.movements.find(&movement.id, &admin()).await.expect_err("gone");
        assert!(matches!(error, ApplicationError::Domain(DomainError::MovementNotFound(_))));
    }

    #[tokio::test]
    async fn only_admins_delete_directly_in_memory() {
        only_admins_delete_directly(in_memory()).await;
    }

    #[tokio::test]
    async fn only_admins_delete_directly_sql() {
        only_admins_delete_directly(sql().await).await;
    }

    #[tokio::test]
    async fn deleting_unknown_movement_is_not_found() {
        let harness = in_memory();

        let error = harness
            .movements
            .delete(&MovementId("mov-missing".to_string()), &admin())
            .await
            .expect_err("missing");

        assert!(matches!(error, ApplicationError::Domain(DomainError::MovementNotFound(_))));
    }
}
