pub mod charge_reconciliation;
pub mod customer_address;
pub mod food_truck;
pub mod menu_category;
pub mod menu_item;
pub mod menu_item_option;
pub mod order;
pub mod order_item;
pub mod order_item_option;
pub mod payment_instrument;

pub use charge_reconciliation::Entity as ChargeReconciliation;
pub use customer_address::Entity as CustomerAddress;
pub use food_truck::Entity as FoodTruck;
pub use menu_category::Entity as MenuCategory;
pub use menu_item::Entity as MenuItem;
pub use menu_item_option::Entity as MenuItemOption;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use order_item_option::Entity as OrderItemOption;
pub use payment_instrument::Entity as PaymentInstrument;
