//! # Dummy Swapper Blueprint
//! Fixed-rate converter of any resource into the stable asset, for testing the lending
//! engine's handling of non-stable reward assets.

use scrypto::prelude::*;

#[blueprint]
mod swapper {
    struct Swapper {
        stable_vault: Vault,
        received_vaults: HashMap<ResourceAddress, Vault>,
        rate: Decimal,
    }

    impl Swapper {
        pub fn instantiate_swapper(stable_funds: Bucket, rate: Decimal) -> Global<Swapper> {
            Self {
                stable_vault: Vault::with_bucket(stable_funds),
                received_vaults: HashMap::new(),
                rate,
            }
            .instantiate()
            .prepare_to_globalize(OwnerRole::None)
            .metadata(metadata! {
                init {
                    "name" => "Dummy Swapper".to_string(), updatable;
                    "description" => "A dummy fixed-rate swapper used for testing Riptide".to_string(), updatable;
                }
            })
            .globalize()
        }

        pub fn swap_to_stable(&mut self, tokens: Bucket) -> Bucket {
            let stable_amount = tokens.amount() * self.rate;
            let address = tokens.resource_address();
            if let Some(vault) = self.received_vaults.get_mut(&address) {
                vault.put(tokens);
            } else {
                self.received_vaults.insert(address, Vault::with_bucket(tokens));
            }
            self.stable_vault.take(stable_amount)
        }

        pub fn set_rate(&mut self, rate: Decimal) {
            self.rate = rate;
        }
    }
}
