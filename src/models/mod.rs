pub mod ebm;
