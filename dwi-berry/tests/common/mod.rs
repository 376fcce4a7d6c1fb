#![allow(dead_code)]

pub mod synthetic;

/// 在测试中打开日志输出. 重复调用无副作用.
pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
}

/// 两个方向的夹角 (度). 对极方向视为同一方向.
pub fn angle_deg(a: &nalgebra::Vector3<f64>, b: &nalgebra::Vector3<f64>) -> f64 {
    let c = a.normalize().dot(&b.normalize()).abs().min(1.0);
    c.acos().to_degrees()
}
