//! # Dummy Reservoir Blueprint
//! Stable-asset vault for testing the lending engine without a real liquidity pool.
//! Disburses and receives funds freely and mints pool units 1:1 for deposits.

use scrypto::prelude::*;

#[blueprint]
mod reservoir {
    struct Reservoir {
        funds: Vault,
        unit_manager: ResourceManager,
    }

    impl Reservoir {
        pub fn instantiate_reservoir(initial_funds: Bucket) -> (Global<Reservoir>, ResourceAddress) {
            let (address_reservation, component_address) =
                Runtime::allocate_component_address(Reservoir::blueprint_id());

            let unit_manager: ResourceManager = ResourceBuilder::new_fungible(OwnerRole::None)
                .divisibility(DIVISIBILITY_MAXIMUM)
                .metadata(metadata! {
                    init {
                        "name" => "Dummy Reservoir Unit".to_string(), updatable;
                        "symbol" => "dRU".to_string(), updatable;
                    }
                })
                .mint_roles(mint_roles! {
                    minter => rule!(require(global_caller(component_address)));
                    minter_updater => rule!(deny_all);
                })
                .create_with_no_initial_supply();

            let unit_address = unit_manager.address();

            let reservoir = Self {
                funds: Vault::with_bucket(initial_funds),
                unit_manager,
            }
            .instantiate()
            .prepare_to_globalize(OwnerRole::None)
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Dummy Reservoir".to_string(), updatable;
                    "description" => "A dummy liquidity reservoir used for testing Riptide".to_string(), updatable;
                }
            })
            .globalize();

            (reservoir, unit_address)
        }

        pub fn available_balance(&self) -> Decimal {
            self.funds.amount()
        }

        pub fn disburse(&mut self, amount: Decimal) -> Bucket {
            self.funds.take(amount)
        }

        pub fn receive(&mut self, funds: Bucket) {
            self.funds.put(funds);
        }

        pub fn deposit(&mut self, funds: Bucket) -> Bucket {
            let units = self.unit_manager.mint(funds.amount());
            self.funds.put(funds);
            units
        }
    }
}
