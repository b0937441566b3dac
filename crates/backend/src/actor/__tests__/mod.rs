mod daemon;
mod helpers;
mod pipeline;
