//! `di-inspect`: инспекция DI контейнера из командной строки.

pub mod commands;
pub mod demo;
