use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use studio_pos_core::domain::movement::{
    ClientId, Folio, Movement, MovementCategory, MovementId, NewMovement, SaleDraft,
};
use studio_pos_core::domain::user::{Role, User};
use studio_pos_core::pricing::{Discount, LineItem};
use studio_pos_db::repositories::{
    MovementRepository, SqlMovementRepository, SqlUserRepository, UserRepository,
};
use studio_pos_db::{DbPool, MovementService};

use crate::commands::{with_migrated_pool, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    match with_migrated_pool("seed", |_config, pool| load(pool)) {
        Ok(movements) => {
            let lines: Vec<String> = movements
                .iter()
                .map(|movement| {
                    format!(
                        "  - {} ({}) {}: {} = {}",
                        movement.id,
                        movement.folio.0,
                        movement.category.as_str(),
                        movement.line_items_description,
                        movement.amount
                    )
                })
                .collect();
            let message = format!(
                "demo dataset ready: users admin-1, staff-1; movements:\n{}",
                lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err(failure) => failure,
    }
}

pub fn demo_users() -> [User; 2] {
    [
        User::new("admin-1", "Dirección", Role::Admin),
        User::new("staff-1", "Recepción", Role::User),
    ]
}

async fn load(pool: DbPool) -> Result<Vec<Movement>, CommandFailure> {
    let users = SqlUserRepository::new(pool.clone());
    let [admin, staff] = demo_users();
    for user in [admin.clone(), staff] {
        users
            .save(user)
            .await
            .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), 5))?;
    }

    let repository = Arc::new(SqlMovementRepository::new(pool));
    let service = MovementService::new(repository.clone());
    let records = demo_movements()
        .map_err(|error| CommandFailure::new("seed_execution", format!("{error:#}"), 5))?;

    let mut seeded = Vec::with_capacity(records.len());
    for record in records {
        let Some(id) = record.id.clone() else {
            continue;
        };
        let existing = repository
            .find_by_id(&id)
            .await
            .map_err(|error| CommandFailure::new("seed_verification", error.to_string(), 6))?;
        let movement = match existing {
            Some(movement) => movement,
            None => service
                .create(record, &admin)
                .await
                .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), 5))?,
        };
        seeded.push(movement);
    }

    Ok(seeded)
}

/// A deposit, a sale that consumes it, and a walk-in sale with a percentage
/// discount. Identity fields are fixed so reruns find the same rows.
fn demo_movements() -> anyhow::Result<Vec<NewMovement>> {
    let deposit = SaleDraft::new(
        ClientId("cli-ana".to_string()),
        MovementCategory::Deposit,
        vec![LineItem::new("Anticipo uñas acrílicas", money("500.00")?, 1)],
    );

    let mut credited_sale = SaleDraft::new(
        ClientId("cli-ana".to_string()),
        MovementCategory::Service,
        vec![
            LineItem::new("Uñas acrílicas", money("1200.00")?, 1),
            LineItem::new("Pedicure", money("370.00")?, 1),
        ],
    )
    .with_discount(
        Discount::DepositCredit {
            value: money("500.00")?,
            source_reference: Some("DEMO1".to_string()),
        },
        Some("anticipo".to_string()),
    );
    credited_sale.payment_method = Some("efectivo".to_string());

    let mut walk_in = SaleDraft::new(
        ClientId::general_public(),
        MovementCategory::Service,
        vec![LineItem::new("Corte", money("300.00")?, 1)],
    )
    .with_discount(Discount::Percentage { value: money("10")? }, Some("cliente frecuente".into()));
    walk_in.payment_method = Some("tarjeta".to_string());

    let drafts = [
        ("mov-demo-001", "DEMO1", deposit),
        ("mov-demo-002", "DEMO2", credited_sale),
        ("mov-demo-003", "DEMO3", walk_in),
    ];
    drafts
        .into_iter()
        .map(|(id, folio, draft)| {
            let mut record = draft.price().with_context(|| format!("pricing demo sale {id}"))?;
            record.id = Some(MovementId(id.to_string()));
            record.folio = Some(Folio(folio.to_string()));
            Ok(record)
        })
        .collect()
}

fn money(value: &str) -> anyhow::Result<Decimal> {
    value.parse().with_context(|| format!("invalid demo amount `{value}`"))
}
