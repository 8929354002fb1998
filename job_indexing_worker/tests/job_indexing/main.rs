mod helpers;
mod storage_engine;
