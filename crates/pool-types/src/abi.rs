//! Contract interfaces the pool talks to.
//!
//! The token contract exposes the mining parameters and `transfer`; the mint
//! helper wraps solution submission with merge-mint support.

use alloy_sol_types::sol;

sol! {
	/// ERC-918 mineable token.
	interface IMineableToken {
		function getMiningDifficulty() external view returns (uint256);
		function getMiningTarget() external view returns (uint256);
		function getChallengeNumber() external view returns (bytes32);
		function getMiningReward() external view returns (uint256);
		function transfer(address to, uint256 tokens) external returns (bool);
	}

	/// Pool-owned helper that mints the primary token and any merge-mined
	/// tokens in one call.
	interface IMintHelper {
		function proxyMergeMint(uint256 nonce, bytes32 challenge_digest, address[] tokens) external returns (bool);
	}
}
