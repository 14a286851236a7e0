mod test_write_deadline;
