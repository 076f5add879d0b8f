pub mod cpu;
pub mod gpu;

pub use cpu::CpuPowerPolicy;
pub use gpu::GpuPowerDaemon;
