pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use authz::{authorize, Action};
pub use domain::cancellation::{
    CancellationDecision, CancellationRequest, CancellationRequestId, CancellationStatus,
    Resolution,
};
pub use domain::movement::{
    AppliedDiscount, CancellationState, ClientId, Folio, Movement, MovementCategory, MovementId,
    NewMovement, SaleDraft,
};
pub use domain::timestamp_now;
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{price_cart, Discount, DiscountDirective, DiscountKind, LineItem, PricingResult};
