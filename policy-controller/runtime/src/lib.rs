pub use gateway_policy_controller_core as core;
pub use gateway_policy_controller_k8s_api as k8s;
pub use gateway_policy_controller_k8s_index as index;
pub use gateway_policy_controller_k8s_status as status;
pub use gateway_policy_controller_translate as translate;

mod args;
mod policies;
mod validation;


pub use self::{
    args::Args,
    policies::Policies,
};
