use alloy_core::sol;

mod descriptor;
mod query;

pub use descriptor::{CallDescriptor, ContractCall, ContractKind, DecodeError, Transfer};
pub use query::Query;

sol! {
    /// Entry points of the deployed batching contract. The caller must have
    /// granted the contract an allowance (fungible) or operator approval
    /// (non-fungible) beforehand.
    #[derive(Debug, PartialEq, Eq)]
    interface IBulkTransfer {
        struct Call {
            address to;
            uint256 amountOrTokenId;
        }

        function bulkTransfer20(address token, Call[] calls) external;
        function bulkTransfer721(address token, Call[] calls) external;
        /// Gas-reduced variant: one recipient, one source token contract.
        function bulkTransfer721Lite(address token, address to, uint256[] tokenIds) external;
    }
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address recipient, uint256 amount) external returns (bool);
        function transferFrom(address sender, address recipient, uint256 amount) external returns (bool);
    }
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC721 {
        function ownerOf(uint256 tokenId) external view returns (address);
        function setApprovalForAll(address operator, bool approved) external;
        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}
