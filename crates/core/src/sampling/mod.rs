pub mod time_sampler;
