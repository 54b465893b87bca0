mod mock_market;
mod pipeline;
